//! Core functionality shared by the SkyRelay control plane.
//!
//! This crate provides the identifier types, configuration, logging and
//! error plumbing used by the router, live-stream and service crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{Config, DispatcherConfig, GatewayConfig, LoggingConfig};
pub use error::{CoreError, Result};
pub use types::{current_timestamp_ms, DeviceSn, WorkspaceId};
