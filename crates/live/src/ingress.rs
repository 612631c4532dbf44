//! Ingress for unsolicited live capacity reports.
//!
//! Gateways periodically publish the live capacity of themselves and every
//! device attached to them. Reports carry no correlation key; each listed
//! device simply replaces its previous snapshot in the [`CapabilityRegistry`].

use crate::capability::{
    CameraCapability, CapabilityRegistry, LiveCapability, VideoCapability, VideoQuality,
};
use serde::{Deserialize, Serialize};
use skyrelay_core::{DeviceSn, WorkspaceId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Capacity ingress errors
#[derive(Debug, Error)]
pub enum IngressError {
    /// Report could not be decoded
    #[error("Malformed capacity report: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Looks up the workspace a device is bound to.
///
/// Device binding is owned by the device management system; this port is
/// all the live-stream core needs of it.
pub trait WorkspaceResolver: Send + Sync {
    fn workspace_of(&self, device_sn: &DeviceSn) -> Option<WorkspaceId>;
}

/// In-memory device binding table
#[derive(Debug, Default)]
pub struct StaticWorkspaceResolver {
    bindings: RwLock<HashMap<DeviceSn, WorkspaceId>>,
}

impl StaticWorkspaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `device_sn` to `workspace_id`, replacing any previous binding
    pub fn bind(&self, device_sn: DeviceSn, workspace_id: WorkspaceId) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_sn, workspace_id);
    }
}

impl FromIterator<(DeviceSn, WorkspaceId)> for StaticWorkspaceResolver {
    fn from_iter<I: IntoIterator<Item = (DeviceSn, WorkspaceId)>>(iter: I) -> Self {
        Self {
            bindings: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl WorkspaceResolver for StaticWorkspaceResolver {
    fn workspace_of(&self, device_sn: &DeviceSn) -> Option<WorkspaceId> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_sn)
            .cloned()
    }
}

/// State message carrying a live capacity report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Reporting gateway
    pub gateway: DeviceSn,
    #[serde(default)]
    pub timestamp: u64,
    pub data: CapacityState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityState {
    pub live_capacity: LiveCapacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveCapacity {
    #[serde(default)]
    pub available_video_number: u32,
    #[serde(default)]
    pub coexist_video_number_max: u32,
    #[serde(default)]
    pub device_list: Vec<DeviceCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapacity {
    pub sn: DeviceSn,
    #[serde(default)]
    pub available_video_number: u32,
    #[serde(default)]
    pub coexist_video_number_max: u32,
    #[serde(default)]
    pub camera_list: Vec<CameraCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCapacity {
    pub camera_index: String,
    #[serde(default)]
    pub available_video_number: u32,
    #[serde(default)]
    pub coexist_video_number_max: u32,
    #[serde(default)]
    pub video_list: Vec<VideoCapacity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCapacity {
    pub video_index: String,
    #[serde(default)]
    pub video_type: String,
    #[serde(default)]
    pub switchable_video_types: Vec<String>,
    /// Quality codes; omitted by devices that stream at every level
    #[serde(default)]
    pub supported_qualities: Option<Vec<u8>>,
}

impl DeviceCapacity {
    fn into_capability(
        self,
        gateway_sn: DeviceSn,
        workspace_id: WorkspaceId,
        reported_at_ms: u64,
    ) -> LiveCapability {
        let device_sn = &self.sn;
        let cameras = self
            .camera_list
            .into_iter()
            .map(|camera| CameraCapability {
                camera_index: camera.camera_index,
                available_video_number: camera.available_video_number,
                coexist_video_number_max: camera.coexist_video_number_max,
                videos: camera
                    .video_list
                    .into_iter()
                    .map(|video| VideoCapability {
                        qualities: known_qualities(
                            device_sn,
                            &video.video_index,
                            video.supported_qualities,
                        ),
                        video_index: video.video_index,
                        video_type: video.video_type,
                        switchable_video_types: video.switchable_video_types,
                    })
                    .collect(),
            })
            .collect();

        LiveCapability {
            device_sn: self.sn,
            gateway_sn,
            workspace_id,
            available_video_number: self.available_video_number,
            coexist_video_number_max: self.coexist_video_number_max,
            cameras,
            reported_at_ms,
        }
    }
}

/// Decode advertised quality codes; unknown codes are dropped with a warning
fn known_qualities(
    device_sn: &DeviceSn,
    video_index: &str,
    codes: Option<Vec<u8>>,
) -> BTreeSet<VideoQuality> {
    let Some(codes) = codes else {
        return VideoQuality::ALL.into_iter().collect();
    };
    codes
        .into_iter()
        .filter_map(|code| match VideoQuality::try_from(code) {
            Ok(quality) => Some(quality),
            Err(_) => {
                warn!(device = %device_sn, video = video_index, code, "ignoring unknown video quality");
                None
            }
        })
        .collect()
}

/// Feeds capacity reports into the capability registry
pub struct CapacityIngress {
    registry: Arc<CapabilityRegistry>,
    resolver: Arc<dyn WorkspaceResolver>,
}

impl CapacityIngress {
    pub fn new(registry: Arc<CapabilityRegistry>, resolver: Arc<dyn WorkspaceResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Decode and apply a raw report, returning the number of devices recorded
    pub fn handle_raw(&self, payload: &[u8]) -> Result<usize, IngressError> {
        let report: CapacityReport = serde_json::from_slice(payload)?;
        Ok(self.handle(report))
    }

    /// Apply a decoded report, returning the number of devices recorded.
    ///
    /// Devices without a workspace binding are skipped.
    pub fn handle(&self, report: CapacityReport) -> usize {
        let gateway_sn = report.gateway;
        let mut recorded = 0;

        for device in report.data.live_capacity.device_list {
            let Some(workspace_id) = self.resolver.workspace_of(&device.sn) else {
                warn!(device = %device.sn, gateway = %gateway_sn, "skipping capacity of unbound device");
                continue;
            };

            let device_sn = device.sn.clone();
            let capability =
                device.into_capability(gateway_sn.clone(), workspace_id, report.timestamp);
            self.registry.report(device_sn, capability);
            recorded += 1;
        }

        debug!(gateway = %gateway_sn, recorded, "capacity report applied");
        recorded
    }
}
