use skyrelay_c2_router::{CommandGateway, ReplyDispatcher, ReplyRegistry, Transport};
use skyrelay_live::{
    CapabilityRegistry, CapacityIngress, LiveSessionController, StaticWorkspaceResolver,
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bridge::HttpBridgeTransport;
use crate::config::ServiceConfig;

pub struct AppState {
    pub gateway: Arc<CommandGateway>,
    pub dispatcher: Arc<ReplyDispatcher>,
    /// Inbound reply queue drained by the dispatcher workers
    pub replies: mpsc::Sender<Vec<u8>>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub ingress: CapacityIngress,
    pub controller: LiveSessionController,
}

impl AppState {
    /// Wire the service against the HTTP bridge
    pub fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let transport =
            HttpBridgeTransport::new(&config.bridge_url, config.core.gateway.command_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Wire the service against any transport.
    ///
    /// Spawns the dispatcher workers, so this must run inside a tokio runtime.
    pub fn with_transport(config: ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        let core = &config.core;
        let registry = Arc::new(ReplyRegistry::with_shards(core.gateway.registry_shards));
        let gateway = Arc::new(CommandGateway::from_config(
            &core.gateway,
            Arc::clone(&registry),
            transport,
        ));

        let dispatcher = Arc::new(ReplyDispatcher::new(registry));
        let (replies, inbound) = mpsc::channel(core.dispatcher.queue_depth);
        dispatcher.spawn_workers(inbound, core.dispatcher.workers);

        let capabilities = Arc::new(CapabilityRegistry::new());
        let resolver: StaticWorkspaceResolver = config.workspace_bindings.into_iter().collect();
        let ingress = CapacityIngress::new(Arc::clone(&capabilities), Arc::new(resolver));
        let controller =
            LiveSessionController::new(Arc::clone(&gateway), Arc::clone(&capabilities));

        AppState {
            gateway,
            dispatcher,
            replies,
            capabilities,
            ingress,
            controller,
        }
    }
}
