use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

mod bridge;
mod config;
mod handlers;
mod state;

use config::ServiceConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    skyrelay_core::logging::init_from_config(&config.core.logging);

    let state = Arc::new(AppState::new(config.clone())?);
    let app = app(Arc::clone(&state));

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(bridge = %config.bridge_url, "live-gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

pub(crate) fn app(state: Arc<AppState>) -> Router {
    let live = Router::new()
        .route("/capacity", get(handlers::get_capacity))
        .route("/streams/start", post(handlers::start_stream))
        .route("/streams/stop", post(handlers::stop_stream))
        .route("/streams/update", post(handlers::update_stream));

    Router::new()
        .route("/health", get(health_check))
        .nest("/manage/api/v1/live", live)
        .route("/ingress/services_reply", post(handlers::ingest_services_reply))
        .route("/ingress/state", post(handlers::ingest_state))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "live-gateway",
        "timestamp": Utc::now().to_rfc3339(),
        "replies": state.dispatcher.stats(),
        "pending_calls": state.gateway.registry().len()
    })))
}

async fn shutdown_signal(state: Arc<AppState>) {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed
        std::future::pending::<()>().await;
    }
    info!("shutting down, cancelling in-flight device calls");
    state.gateway.shutdown();
}
