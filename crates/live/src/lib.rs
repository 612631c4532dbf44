//! SkyRelay live-stream control
//!
//! Built on the correlation broker in `skyrelay-c2-router`, this crate
//! provides:
//! - Live capability snapshots per device and their in-memory registry
//! - Ingress of unsolicited capacity reports from device gateways
//! - The live session model (`Requested -> Live -> Stopped`)
//! - The controller driving start / stop / update-quality

pub mod capability;
pub mod controller;
pub mod error;
pub mod ingress;
pub mod session;

pub use capability::{
    CameraCapability, CapabilityRegistry, LiveCapability, VideoCapability, VideoChannel,
    VideoQuality,
};
pub use controller::{LiveSessionController, StartLiveRequest};
pub use error::{LiveError, LiveResult};
pub use ingress::{CapacityIngress, CapacityReport, IngressError, StaticWorkspaceResolver, WorkspaceResolver};
pub use session::{LiveSession, SessionStatus, UrlType, VideoId};
