use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skyrelay_c2_router::GatewayError;
use skyrelay_core::WorkspaceId;
use skyrelay_live::{LiveCapability, LiveError, LiveSession, StartLiveRequest, VideoId, VideoQuality};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use crate::state::AppState;

pub const WORKSPACE_HEADER: &str = "x-workspace-id";

/// Response envelope shared by every route; `code == 0` is success
#[derive(Debug, Serialize, Deserialize)]
pub struct HttpResult<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T> HttpResult<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StopStreamBody {
    pub video_id: VideoId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStreamBody {
    pub video_id: VideoId,
    pub video_quality: VideoQuality,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Overloaded(String),
    Live(LiveError),
}

impl From<LiveError> for ApiError {
    fn from(e: LiveError) -> Self {
        ApiError::Live(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Live(e) => match e {
                LiveError::UnsupportedCapability { .. }
                | LiveError::InvalidVideoId(_)
                | LiveError::InvalidQuality(_)
                | LiveError::InvalidUrlType(_) => StatusCode::BAD_REQUEST,
                LiveError::UnknownSession(_) => StatusCode::NOT_FOUND,
                LiveError::SessionAlreadyActive(_) => StatusCode::CONFLICT,
                LiveError::DeviceReportedFailure { .. } => StatusCode::BAD_GATEWAY,
                LiveError::InvalidTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                LiveError::Gateway(e) => match e {
                    GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    GatewayError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    GatewayError::PublishFailed { .. } => StatusCode::BAD_GATEWAY,
                    GatewayError::DuplicateKey(_) | GatewayError::Encode(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
        }
    }

    fn code(&self, status: StatusCode) -> i32 {
        match self {
            ApiError::Live(LiveError::DeviceReportedFailure { code, .. }) => *code,
            _ => i32::from(status.as_u16()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(m) | ApiError::Overloaded(m) => m.clone(),
            ApiError::Live(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(status = %status, "{message}");
        } else {
            warn!(status = %status, "{message}");
        }

        let body = HttpResult::<Value> {
            code: self.code(status),
            message,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<HttpResult<T>>, ApiError>;

pub async fn get_capacity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Vec<LiveCapability>> {
    let workspace_id = headers
        .get(WORKSPACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(WorkspaceId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {WORKSPACE_HEADER} header")))?;

    Ok(HttpResult::success(state.capabilities.get(&workspace_id)))
}

pub async fn start_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartLiveRequest>, JsonRejection>,
) -> ApiResult<LiveSession> {
    let Json(request) = payload?;
    let session = state.controller.start(request).await?;
    Ok(HttpResult::success(session))
}

pub async fn stop_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StopStreamBody>, JsonRejection>,
) -> ApiResult<LiveSession> {
    let Json(body) = payload?;
    let session = state.controller.stop(&body.video_id).await?;
    Ok(HttpResult::success(session))
}

pub async fn update_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateStreamBody>, JsonRejection>,
) -> ApiResult<LiveSession> {
    let Json(body) = payload?;
    let session = state
        .controller
        .update_quality(&body.video_id, body.video_quality)
        .await?;
    Ok(HttpResult::success(session))
}

/// Bridge hand-off for replies arriving on `thing/product/+/services_reply`
pub async fn ingest_services_reply(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Value> {
    state.replies.try_send(body.to_vec()).map_err(|e| match e {
        TrySendError::Full(_) => ApiError::Overloaded("reply queue full".to_string()),
        TrySendError::Closed(_) => ApiError::Overloaded("reply dispatcher stopped".to_string()),
    })?;
    Ok(HttpResult::success(json!({ "queued": true })))
}

/// Bridge hand-off for gateway state messages carrying live capacity
pub async fn ingest_state(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Value> {
    let recorded = state
        .ingress
        .handle_raw(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(HttpResult::success(json!({ "recorded": recorded })))
}
