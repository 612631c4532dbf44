//! Error types for live-stream control.

use crate::capability::VideoQuality;
use crate::session::{SessionStatus, VideoId};
use skyrelay_c2_router::{GatewayError, ServiceMethod};
use skyrelay_core::DeviceSn;
use thiserror::Error;

/// Errors surfaced by live-stream operations.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Device never advertised the requested channel or quality
    #[error("Device {device_sn} does not support {quality:?} on channel {channel}")]
    UnsupportedCapability {
        device_sn: DeviceSn,
        channel: String,
        quality: VideoQuality,
    },

    /// No active session for the video id
    #[error("Unknown live session: {0}")]
    UnknownSession(VideoId),

    /// A session is already requested or live for the video id
    #[error("Live session already active: {0}")]
    SessionAlreadyActive(VideoId),

    /// Device answered with a non-zero result code
    #[error("Device rejected {method} with code {code}")]
    DeviceReportedFailure { method: ServiceMethod, code: i32 },

    /// Video id is not `{sn}/{camera_index}/{video_index}`
    #[error("Invalid video id: {0}")]
    InvalidVideoId(String),

    /// Unknown video quality code
    #[error("Invalid video quality: {0}")]
    InvalidQuality(u8),

    /// Unknown stream URL type code
    #[error("Invalid url type: {0}")]
    InvalidUrlType(u8),

    /// Session state machine violation
    #[error("Invalid session transition for {video_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        video_id: VideoId,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Command gateway failure (timeout, cancellation, publish failure)
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Result type for live-stream operations.
pub type LiveResult<T> = Result<T, LiveError>;
