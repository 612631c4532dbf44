//! Command gateway: synchronous request/reply over the pub/sub transport
//!
//! [`CommandGateway::send`] registers a fresh correlation key, publishes the
//! command and suspends until the matching reply arrives, the timeout
//! elapses or the call is cancelled. The gateway never retries.

#![warn(missing_docs)]

use crate::command_types::{CorrelationKey, ServiceCommand, ServiceMethod, ServiceReply};
use crate::correlation::{CorrelationError, CorrelationRegistry};
use crate::transport::{services_topic, ServiceEnvelope, Transport, TransportError};
use skyrelay_core::{DeviceSn, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Registry type shared by the gateway and the reply dispatcher
pub type ReplyRegistry = CorrelationRegistry<CorrelationKey, ServiceReply>;

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Generated key collided with an in-flight call
    #[error(transparent)]
    DuplicateKey(#[from] CorrelationError),

    /// Command could not be encoded
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// Transport refused the publish
    #[error("Publish of {method} to {gateway_sn} failed: {source}")]
    PublishFailed {
        /// Target gateway
        gateway_sn: DeviceSn,
        /// Invoked method
        method: ServiceMethod,
        /// Transport failure
        #[source]
        source: TransportError,
    },

    /// No reply within the allotted time
    #[error("No reply to {method} from {gateway_sn} within {timeout_ms} ms")]
    Timeout {
        /// Target gateway
        gateway_sn: DeviceSn,
        /// Invoked method
        method: ServiceMethod,
        /// Allotted wait
        timeout_ms: u64,
    },

    /// Caller or process abandoned the wait
    #[error("Call to {method} on {gateway_sn} was cancelled")]
    Cancelled {
        /// Target gateway
        gateway_sn: DeviceSn,
        /// Invoked method
        method: ServiceMethod,
    },
}

impl GatewayError {
    /// Check if the error is a reply timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }

    /// Check if the wait was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Cancelled { .. })
    }
}

/// Egress point for device service calls
pub struct CommandGateway {
    registry: Arc<ReplyRegistry>,
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
    shutdown: CancellationToken,
}

impl CommandGateway {
    /// Default reply timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a gateway publishing through `transport`
    pub fn new(registry: Arc<ReplyRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            default_timeout: Self::DEFAULT_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a gateway with settings from the `[gateway]` section
    pub fn from_config(
        config: &GatewayConfig,
        registry: Arc<ReplyRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(registry, transport).with_default_timeout(config.command_timeout())
    }

    /// Override the default reply timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Default reply timeout
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Registry the gateway registers calls in
    pub fn registry(&self) -> &Arc<ReplyRegistry> {
        &self.registry
    }

    /// Cancel every in-flight and future call
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Publish `command` and wait up to `timeout` for its reply
    pub async fn send(
        &self,
        command: ServiceCommand,
        timeout: Duration,
    ) -> Result<ServiceReply, GatewayError> {
        self.send_with_cancel(command, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`CommandGateway::send`], additionally aborting when `cancel` fires
    pub async fn send_with_cancel(
        &self,
        command: ServiceCommand,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ServiceReply, GatewayError> {
        let key = CorrelationKey::generate(command.method);
        let gateway_sn = command.gateway_sn.clone();
        let method = command.method;

        let pending = self.registry.register(key)?;

        let payload = serde_json::to_vec(&ServiceEnvelope::new(&key, &command))?;
        if let Err(source) = self
            .transport
            .publish(&services_topic(&gateway_sn), payload)
            .await
        {
            drop(pending);
            warn!(%key, gateway = %gateway_sn, error = %source, "service call publish failed");
            return Err(GatewayError::PublishFailed {
                gateway_sn,
                method,
                source,
            });
        }
        debug!(%key, gateway = %gateway_sn, "service call published");

        let reply = pending.wait();
        tokio::pin!(reply);

        tokio::select! {
            received = &mut reply => match received {
                Some(reply) => Ok(reply),
                None => Err(GatewayError::Cancelled { gateway_sn, method }),
            },
            _ = tokio::time::sleep(timeout) => {
                self.registry.cancel(&key);
                warn!(%key, gateway = %gateway_sn, timeout_ms = timeout.as_millis() as u64, "service call timed out");
                Err(GatewayError::Timeout {
                    gateway_sn,
                    method,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = cancel.cancelled() => {
                self.registry.cancel(&key);
                debug!(%key, "service call cancelled by caller");
                Err(GatewayError::Cancelled { gateway_sn, method })
            }
            _ = self.shutdown.cancelled() => {
                self.registry.cancel(&key);
                debug!(%key, "service call cancelled by shutdown");
                Err(GatewayError::Cancelled { gateway_sn, method })
            }
        }
    }
}

impl std::fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGateway")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
