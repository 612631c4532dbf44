//! Live session model
//!
//! A session is the control plane's record of one video stream pushed by a
//! device. Status moves `Requested -> Live -> Stopped`; `Stopped` is final.

use crate::capability::{VideoChannel, VideoQuality};
use crate::error::LiveError;
use serde::{Deserialize, Serialize};
use skyrelay_core::{current_timestamp_ms, DeviceSn};
use std::fmt;
use std::str::FromStr;

/// Where the device pushes the stream, integer coded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UrlType {
    Agora,
    Rtmp,
    Rtsp,
    Gb28181,
}

impl TryFrom<u8> for UrlType {
    type Error = LiveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(UrlType::Agora),
            1 => Ok(UrlType::Rtmp),
            2 => Ok(UrlType::Rtsp),
            3 => Ok(UrlType::Gb28181),
            other => Err(LiveError::InvalidUrlType(other)),
        }
    }
}

impl From<UrlType> for u8 {
    fn from(url_type: UrlType) -> Self {
        match url_type {
            UrlType::Agora => 0,
            UrlType::Rtmp => 1,
            UrlType::Rtsp => 2,
            UrlType::Gb28181 => 3,
        }
    }
}

/// Stream identifier `{device_sn}/{camera_index}/{video_index}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId {
    pub device_sn: DeviceSn,
    pub channel: VideoChannel,
}

impl VideoId {
    pub fn new(device_sn: DeviceSn, channel: VideoChannel) -> Self {
        Self { device_sn, channel }
    }
}

impl FromStr for VideoId {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [sn, camera, video] if !sn.is_empty() && !camera.is_empty() && !video.is_empty() => {
                Ok(Self::new(DeviceSn::new(*sn), VideoChannel::new(*camera, *video)))
            }
            _ => Err(LiveError::InvalidVideoId(s.to_string())),
        }
    }
}

impl TryFrom<String> for VideoId {
    type Error = LiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_sn, self.channel)
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Start command issued, no reply yet
    Requested,
    /// Device confirmed the stream
    Live,
    /// Stream stopped
    Stopped,
}

/// Control plane record of one video stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSession {
    pub video_id: VideoId,
    /// Gateway relaying commands for the stream
    pub gateway_sn: DeviceSn,
    pub quality: VideoQuality,
    pub url_type: UrlType,
    pub url: String,
    pub status: SessionStatus,
    pub started_at_ms: u64,
    pub updated_at_ms: u64,
}

impl LiveSession {
    pub(crate) fn requested(
        video_id: VideoId,
        gateway_sn: DeviceSn,
        url_type: UrlType,
        url: String,
        quality: VideoQuality,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            video_id,
            gateway_sn,
            quality,
            url_type,
            url,
            status: SessionStatus::Requested,
            started_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Check if the session is requested or live
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Requested | SessionStatus::Live)
    }

    pub(crate) fn mark_live(&mut self) -> Result<(), LiveError> {
        self.transition(SessionStatus::Live, |from| from == SessionStatus::Requested)
    }

    pub(crate) fn mark_stopped(&mut self) -> Result<(), LiveError> {
        self.transition(SessionStatus::Stopped, |from| from != SessionStatus::Stopped)
    }

    pub(crate) fn set_quality(&mut self, quality: VideoQuality) -> Result<(), LiveError> {
        if !self.is_active() {
            return Err(LiveError::UnknownSession(self.video_id.clone()));
        }
        self.quality = quality;
        self.updated_at_ms = current_timestamp_ms();
        Ok(())
    }

    fn transition(
        &mut self,
        to: SessionStatus,
        allowed: impl FnOnce(SessionStatus) -> bool,
    ) -> Result<(), LiveError> {
        if !allowed(self.status) {
            return Err(LiveError::InvalidTransition {
                video_id: self.video_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at_ms = current_timestamp_ms();
        Ok(())
    }
}
