//! Live session controller
//!
//! Drives start / stop / update-quality for live streams. Each operation
//! validates against the advertised capability, issues one service call
//! through the [`CommandGateway`] and mutates session state only when the
//! device answers with success.
//!
//! Operations on the same video id are serialized by a per-id async mutex;
//! different video ids proceed independently. Reads go to a snapshot of
//! committed sessions and never wait on an operation in flight.

use crate::capability::{CapabilityRegistry, VideoQuality};
use crate::error::{LiveError, LiveResult};
use crate::session::{LiveSession, UrlType, VideoId};
use serde::{Deserialize, Serialize};
use skyrelay_c2_router::{
    CommandGateway, GatewayError, ServiceCommand, ServiceMethod, ServiceReply,
};
use skyrelay_core::DeviceSn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

type Slot = Arc<AsyncMutex<Option<LiveSession>>>;

/// Parameters for starting a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartLiveRequest {
    pub url_type: UrlType,
    pub url: String,
    pub video_id: VideoId,
    pub video_quality: VideoQuality,
}

#[derive(Serialize)]
struct LiveStartParams<'a> {
    url_type: UrlType,
    url: &'a str,
    video_id: &'a VideoId,
    video_quality: VideoQuality,
}

#[derive(Serialize)]
struct LiveStopParams<'a> {
    video_id: &'a VideoId,
}

#[derive(Serialize)]
struct LiveSetQualityParams<'a> {
    video_id: &'a VideoId,
    video_quality: VideoQuality,
}

/// Start/stop/update state machine for live streams
pub struct LiveSessionController {
    gateway: Arc<CommandGateway>,
    capabilities: Arc<CapabilityRegistry>,
    slots: Mutex<HashMap<VideoId, Slot>>,
    /// Active sessions as of the last success reply, written under the slot lock
    committed: RwLock<HashMap<VideoId, LiveSession>>,
    command_timeout: Duration,
}

impl LiveSessionController {
    /// Create a controller using the gateway's default timeout
    pub fn new(gateway: Arc<CommandGateway>, capabilities: Arc<CapabilityRegistry>) -> Self {
        let command_timeout = gateway.default_timeout();
        Self {
            gateway,
            capabilities,
            slots: Mutex::new(HashMap::new()),
            committed: RwLock::new(HashMap::new()),
            command_timeout,
        }
    }

    /// Override how long each operation waits for the device
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Start pushing the stream described by `request`.
    ///
    /// The device is not contacted unless its advertised capability covers
    /// the requested channel and quality.
    pub async fn start(&self, request: StartLiveRequest) -> LiveResult<LiveSession> {
        let video_id = request.video_id.clone();
        let gateway_sn = self.check_capability(&video_id, request.video_quality)?;

        let mut slot = self.lock_or_create_slot(&video_id).await;
        if slot.as_ref().is_some_and(LiveSession::is_active) {
            return Err(LiveError::SessionAlreadyActive(video_id));
        }

        let mut session = LiveSession::requested(
            video_id.clone(),
            gateway_sn.clone(),
            request.url_type,
            request.url,
            request.video_quality,
        );
        let params = LiveStartParams {
            url_type: session.url_type,
            url: &session.url,
            video_id: &video_id,
            video_quality: session.quality,
        };

        let outcome = self
            .call(gateway_sn, ServiceMethod::LiveStartPush, &params)
            .await;
        match outcome {
            Ok(_) => {
                session.mark_live()?;
                info!(video_id = %video_id, quality = ?session.quality, "live stream started");
                *slot = Some(session.clone());
                self.commit(session.clone());
                Ok(session)
            }
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "live start failed");
                *slot = None;
                self.retire(&video_id, &slot);
                Err(e)
            }
        }
    }

    /// Stop the stream `video_id`, returning its final record.
    ///
    /// On failure the session is left as it was and the call may be retried.
    pub async fn stop(&self, video_id: &VideoId) -> LiveResult<LiveSession> {
        let mut slot = self
            .lock_slot(video_id)
            .await
            .ok_or_else(|| LiveError::UnknownSession(video_id.clone()))?;
        let gateway_sn = Self::active(&slot, video_id)?.gateway_sn.clone();

        self.call(gateway_sn, ServiceMethod::LiveStopPush, &LiveStopParams { video_id })
            .await?;

        let mut session = slot
            .take()
            .ok_or_else(|| LiveError::UnknownSession(video_id.clone()))?;
        session.mark_stopped()?;
        self.uncommit(video_id);
        self.retire(video_id, &slot);
        info!(video_id = %video_id, "live stream stopped");
        Ok(session)
    }

    /// Change the quality of the stream `video_id`.
    ///
    /// On failure the previous quality is kept.
    pub async fn update_quality(
        &self,
        video_id: &VideoId,
        quality: VideoQuality,
    ) -> LiveResult<LiveSession> {
        let mut slot = self
            .lock_slot(video_id)
            .await
            .ok_or_else(|| LiveError::UnknownSession(video_id.clone()))?;
        let gateway_sn = Self::active(&slot, video_id)?.gateway_sn.clone();
        self.check_capability(video_id, quality)?;

        self.call(
            gateway_sn,
            ServiceMethod::LiveSetQuality,
            &LiveSetQualityParams {
                video_id,
                video_quality: quality,
            },
        )
        .await?;

        let session = slot
            .as_mut()
            .ok_or_else(|| LiveError::UnknownSession(video_id.clone()))?;
        session.set_quality(quality)?;
        let session = session.clone();
        self.commit(session.clone());
        info!(video_id = %video_id, quality = ?quality, "live stream quality updated");
        Ok(session)
    }

    /// Current record of the stream `video_id`, if active.
    ///
    /// Returns the last committed state while an operation on the same id
    /// is waiting for its device.
    pub fn session(&self, video_id: &VideoId) -> Option<LiveSession> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(video_id)
            .cloned()
    }

    /// Every active session, ordered by video id
    pub fn active_sessions(&self) -> Vec<LiveSession> {
        let mut sessions: Vec<LiveSession> = self
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        sessions
    }

    fn commit(&self, session: LiveSession) {
        self.committed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.video_id.clone(), session);
    }

    fn uncommit(&self, video_id: &VideoId) {
        self.committed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(video_id);
    }

    fn check_capability(&self, video_id: &VideoId, quality: VideoQuality) -> LiveResult<DeviceSn> {
        let unsupported = || LiveError::UnsupportedCapability {
            device_sn: video_id.device_sn.clone(),
            channel: video_id.channel.to_string(),
            quality,
        };

        let capability = self
            .capabilities
            .get_device(&video_id.device_sn)
            .ok_or_else(unsupported)?;
        if !capability.supports(&video_id.channel, quality) {
            return Err(unsupported());
        }
        Ok(capability.gateway_sn)
    }

    fn active<'a>(
        slot: &'a Option<LiveSession>,
        video_id: &VideoId,
    ) -> LiveResult<&'a LiveSession> {
        slot.as_ref()
            .filter(|s| s.is_active())
            .ok_or_else(|| LiveError::UnknownSession(video_id.clone()))
    }

    async fn call<P: Serialize>(
        &self,
        gateway_sn: DeviceSn,
        method: ServiceMethod,
        params: &P,
    ) -> LiveResult<ServiceReply> {
        let command =
            ServiceCommand::new(gateway_sn, method, params).map_err(GatewayError::from)?;
        let reply = self.gateway.send(command, self.command_timeout).await?;

        if reply.is_success() {
            Ok(reply)
        } else {
            Err(LiveError::DeviceReportedFailure {
                method,
                code: reply.result,
            })
        }
    }

    /// Lock the existing slot of `video_id`.
    ///
    /// A slot retired while we waited for its lock is skipped, so a session
    /// is never read from or written into a slot no longer in the map.
    async fn lock_slot(&self, video_id: &VideoId) -> Option<OwnedMutexGuard<Option<LiveSession>>> {
        loop {
            let slot = {
                let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(slots.get(video_id)?)
            };
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(video_id, &slot) {
                return Some(guard);
            }
        }
    }

    /// Lock the slot of `video_id`, creating an empty one if needed
    async fn lock_or_create_slot(&self, video_id: &VideoId) -> OwnedMutexGuard<Option<LiveSession>> {
        loop {
            let slot = {
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(slots.entry(video_id.clone()).or_default())
            };
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(video_id, &slot) {
                return guard;
            }
        }
    }

    fn is_current(&self, video_id: &VideoId, slot: &Slot) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(video_id)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    /// Drop the map entry of an emptied slot while still holding its lock
    fn retire(&self, video_id: &VideoId, guard: &OwnedMutexGuard<Option<LiveSession>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(video_id)
            .is_some_and(|s| Arc::ptr_eq(s, OwnedMutexGuard::mutex(guard)))
        {
            slots.remove(video_id);
        }
    }
}
