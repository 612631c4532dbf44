//! Test utilities wiring the full stack against a simulated device gateway

use rand::Rng;
use serde_json::{json, Value};
use skyrelay_c2_router::{
    ChannelTransport, CommandGateway, PublishedMessage, ReplyDispatcher, ReplyEnvelope,
    ReplyRegistry, ServiceEnvelope, ServiceReply,
};
use skyrelay_core::{DeviceSn, WorkspaceId};
use skyrelay_live::{
    CapabilityRegistry, CapacityIngress, LiveSessionController, StaticWorkspaceResolver,
    StartLiveRequest, UrlType, VideoId, VideoQuality,
};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;

static LOGGING: Once = Once::new();

/// Install a test log subscriber once per process
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// How the simulated gateway answers service calls
#[derive(Debug, Clone, Copy)]
pub struct DeviceBehaviour {
    /// Result code put in every reply
    pub result: i32,
    /// Upper bound of the random reply latency
    pub max_delay: Duration,
    /// Swallow calls without answering
    pub silent: bool,
}

impl Default for DeviceBehaviour {
    fn default() -> Self {
        Self {
            result: 0,
            max_delay: Duration::from_millis(5),
            silent: false,
        }
    }
}

/// Full live-stream stack with a simulated gateway on the far side of the transport
pub struct TestStack {
    pub registry: Arc<ReplyRegistry>,
    pub gateway: Arc<CommandGateway>,
    pub dispatcher: Arc<ReplyDispatcher>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub ingress: CapacityIngress,
    pub controller: LiveSessionController,
    pub behaviour: Arc<Mutex<DeviceBehaviour>>,
    pub published: Arc<Mutex<Vec<ServiceEnvelope>>>,
}

impl TestStack {
    pub fn new(command_timeout: Duration, bindings: &[(&str, &str)]) -> Self {
        init_test_logging();

        let registry = Arc::new(ReplyRegistry::new());
        let (transport, outbound) = ChannelTransport::new(1024);
        let gateway = Arc::new(
            CommandGateway::new(Arc::clone(&registry), Arc::new(transport))
                .with_default_timeout(command_timeout),
        );

        let dispatcher = Arc::new(ReplyDispatcher::new(Arc::clone(&registry)));
        let (replies, inbound) = mpsc::channel(1024);
        dispatcher.spawn_workers(inbound, 4);

        let behaviour = Arc::new(Mutex::new(DeviceBehaviour::default()));
        let published = Arc::new(Mutex::new(Vec::new()));
        spawn_simulated_gateway(
            outbound,
            replies,
            Arc::clone(&behaviour),
            Arc::clone(&published),
        );

        let capabilities = Arc::new(CapabilityRegistry::new());
        let resolver: StaticWorkspaceResolver = bindings
            .iter()
            .map(|(sn, ws)| (DeviceSn::new(*sn), WorkspaceId::new(*ws)))
            .collect();
        let ingress = CapacityIngress::new(Arc::clone(&capabilities), Arc::new(resolver));
        let controller =
            LiveSessionController::new(Arc::clone(&gateway), Arc::clone(&capabilities));

        Self {
            registry,
            gateway,
            dispatcher,
            capabilities,
            ingress,
            controller,
            behaviour,
            published,
        }
    }

    pub fn set_behaviour(&self, behaviour: DeviceBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

/// Answer every published call on the shared reply queue after a random delay
fn spawn_simulated_gateway(
    mut outbound: mpsc::Receiver<PublishedMessage>,
    replies: mpsc::Sender<Vec<u8>>,
    behaviour: Arc<Mutex<DeviceBehaviour>>,
    published: Arc<Mutex<Vec<ServiceEnvelope>>>,
) {
    tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let Ok(request) = msg.service_envelope() else {
                continue;
            };
            published.lock().unwrap().push(request.clone());

            let current = *behaviour.lock().unwrap();
            if current.silent {
                continue;
            }
            let delay_ms = current.max_delay.as_millis() as u64;
            let delay = Duration::from_millis(rand::thread_rng().gen_range(0..=delay_ms));
            let replies = replies.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let reply = ReplyEnvelope::answering(&request, ServiceReply::failed(current.result));
                if let Ok(bytes) = serde_json::to_vec(&reply) {
                    let _ = replies.send(bytes).await;
                }
            });
        }
    });
}

/// Encode a gateway state message advertising one `normal-0` video on
/// camera `39-0-7` for each device, with the given quality codes
pub fn capacity_report(gateway: &str, devices: &[(&str, &[u8])]) -> Vec<u8> {
    let device_list: Vec<Value> = devices
        .iter()
        .map(|(sn, qualities)| {
            json!({
                "sn": sn,
                "available_video_number": 1,
                "coexist_video_number_max": 1,
                "camera_list": [{
                    "camera_index": "39-0-7",
                    "available_video_number": 1,
                    "coexist_video_number_max": 1,
                    "video_list": [{
                        "video_index": "normal-0",
                        "video_type": "normal",
                        "switchable_video_types": ["normal", "wide"],
                        "supported_qualities": qualities
                    }]
                }]
            })
        })
        .collect();

    json!({
        "gateway": gateway,
        "timestamp": 1654070968655u64,
        "data": { "live_capacity": {
            "available_video_number": devices.len(),
            "coexist_video_number_max": 1,
            "device_list": device_list
        }}
    })
    .to_string()
    .into_bytes()
}

/// Video id of the advertised `normal-0` stream of `device_sn`
pub fn video_id(device_sn: &str) -> VideoId {
    format!("{device_sn}/39-0-7/normal-0")
        .parse()
        .expect("valid video id")
}

pub fn start_request(device_sn: &str, quality: VideoQuality) -> StartLiveRequest {
    StartLiveRequest {
        url_type: UrlType::Rtmp,
        url: format!("rtmp://media.local/live/{device_sn}"),
        video_id: video_id(device_sn),
        video_quality: quality,
    }
}
