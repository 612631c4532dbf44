//! C2 Router - request/reply correlation for device service calls
//!
//! Devices receive commands over an asynchronous publish/subscribe transport
//! and answer later on a shared reply topic. This crate bridges that back to
//! an ordinary awaited call:
//! - Command and reply types for device service calls
//! - Wire envelopes and the [`Transport`] port
//! - A sharded correlation registry of one-shot reply slots
//! - The reply dispatcher draining inbound replies
//! - The command gateway publishing commands and awaiting replies
//!
//! # Architecture
//!
//! 1. `CommandGateway::send` registers a fresh correlation key
//! 2. The command is published to the device gateway's services topic
//! 3. The device replies on the shared reply topic
//! 4. `ReplyDispatcher` decodes the reply and delivers it by key
//! 5. The waiting `send` call resolves, times out or is cancelled
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use skyrelay_c2_router::{
//!     ChannelTransport, CommandGateway, ReplyDispatcher, ReplyRegistry, ServiceCommand,
//!     ServiceMethod,
//! };
//! use skyrelay_core::DeviceSn;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ReplyRegistry::new());
//! let (transport, _outbound) = ChannelTransport::new(64);
//! let gateway = CommandGateway::new(Arc::clone(&registry), Arc::new(transport));
//! let _dispatcher = ReplyDispatcher::new(registry);
//!
//! let command = ServiceCommand {
//!     gateway_sn: DeviceSn::new("4TADKAQ000002J"),
//!     method: ServiceMethod::LiveStopPush,
//!     data: json!({ "video_id": "1581F5BMD2323001/39-0-7/normal-0" }),
//! };
//! let reply = gateway.send(command, Duration::from_secs(5)).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod command_types;
pub mod correlation;
pub mod dispatcher;
pub mod gateway;
pub mod transport;

// Re-export commonly used types
pub use command_types::{CorrelationKey, ServiceCommand, ServiceMethod, ServiceReply};
pub use correlation::{CorrelationError, CorrelationRegistry, PendingReply};
pub use dispatcher::{DispatchOutcome, DispatchStats, ReplyDispatcher};
pub use gateway::{CommandGateway, GatewayError, ReplyRegistry};
pub use transport::{
    services_topic, ChannelTransport, PublishedMessage, ReplyEnvelope, ServiceEnvelope,
    Transport, TransportError,
};
