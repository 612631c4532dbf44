//! Live-stream capabilities advertised by devices.
//!
//! Devices announce what they can stream without being asked. The latest
//! announcement per device replaces the previous one wholesale.

use crate::error::LiveError;
use serde::{Deserialize, Serialize};
use skyrelay_core::{DeviceSn, WorkspaceId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Stream quality levels, integer coded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VideoQuality {
    /// Device picks the quality
    Adaptive,
    /// 960x540
    Smooth,
    /// 1280x720
    StandardDefinition,
    /// 1920x1080
    HighDefinition,
    /// 3840x2160
    UltraHighDefinition,
}

impl VideoQuality {
    /// Every quality level
    pub const ALL: [VideoQuality; 5] = [
        VideoQuality::Adaptive,
        VideoQuality::Smooth,
        VideoQuality::StandardDefinition,
        VideoQuality::HighDefinition,
        VideoQuality::UltraHighDefinition,
    ];
}

impl TryFrom<u8> for VideoQuality {
    type Error = LiveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(VideoQuality::Adaptive),
            1 => Ok(VideoQuality::Smooth),
            2 => Ok(VideoQuality::StandardDefinition),
            3 => Ok(VideoQuality::HighDefinition),
            4 => Ok(VideoQuality::UltraHighDefinition),
            other => Err(LiveError::InvalidQuality(other)),
        }
    }
}

impl From<VideoQuality> for u8 {
    fn from(quality: VideoQuality) -> Self {
        match quality {
            VideoQuality::Adaptive => 0,
            VideoQuality::Smooth => 1,
            VideoQuality::StandardDefinition => 2,
            VideoQuality::HighDefinition => 3,
            VideoQuality::UltraHighDefinition => 4,
        }
    }
}

/// A video source on a device: one video of one camera
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VideoChannel {
    /// Camera payload index, e.g. `39-0-7`
    pub camera_index: String,
    /// Video index within the camera, e.g. `normal-0`
    pub video_index: String,
}

impl VideoChannel {
    /// Create a channel
    pub fn new(camera_index: impl Into<String>, video_index: impl Into<String>) -> Self {
        Self {
            camera_index: camera_index.into(),
            video_index: video_index.into(),
        }
    }
}

impl fmt::Display for VideoChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.camera_index, self.video_index)
    }
}

/// One streamable video of a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCapability {
    pub video_index: String,
    pub video_type: String,
    pub switchable_video_types: Vec<String>,
    pub qualities: BTreeSet<VideoQuality>,
}

/// A camera and the videos it can stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapability {
    pub camera_index: String,
    pub available_video_number: u32,
    pub coexist_video_number_max: u32,
    pub videos: Vec<VideoCapability>,
}

/// Latest live capability snapshot of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCapability {
    pub device_sn: DeviceSn,
    /// Gateway that relays service calls to the device
    pub gateway_sn: DeviceSn,
    pub workspace_id: WorkspaceId,
    pub available_video_number: u32,
    pub coexist_video_number_max: u32,
    pub cameras: Vec<CameraCapability>,
    pub reported_at_ms: u64,
}

impl LiveCapability {
    /// Find the advertised video for `channel`
    pub fn video(&self, channel: &VideoChannel) -> Option<&VideoCapability> {
        self.cameras
            .iter()
            .find(|camera| camera.camera_index == channel.camera_index)?
            .videos
            .iter()
            .find(|video| video.video_index == channel.video_index)
    }

    /// Check whether `channel` can stream at `quality`.
    ///
    /// `Adaptive` is accepted on any advertised channel with at least one
    /// quality level.
    pub fn supports(&self, channel: &VideoChannel, quality: VideoQuality) -> bool {
        match self.video(channel) {
            Some(video) if quality == VideoQuality::Adaptive => !video.qualities.is_empty(),
            Some(video) => video.qualities.contains(&quality),
            None => false,
        }
    }
}

/// In-memory store of the latest capability per device
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    devices: RwLock<HashMap<DeviceSn, LiveCapability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was known about `device_sn` with `capability`
    pub fn report(&self, device_sn: DeviceSn, mut capability: LiveCapability) {
        capability.device_sn = device_sn.clone();
        debug!(device = %device_sn, cameras = capability.cameras.len(), "live capability reported");
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_sn, capability);
    }

    /// Capabilities of every device in `workspace_id`, ordered by serial number
    pub fn get(&self, workspace_id: &WorkspaceId) -> Vec<LiveCapability> {
        let mut capabilities: Vec<LiveCapability> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|capability| &capability.workspace_id == workspace_id)
            .cloned()
            .collect();
        capabilities.sort_by(|a, b| a.device_sn.cmp(&b.device_sn));
        capabilities
    }

    /// Capability of a single device
    pub fn get_device(&self, device_sn: &DeviceSn) -> Option<LiveCapability> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_sn)
            .cloned()
    }

    /// Number of devices with a recorded capability
    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
