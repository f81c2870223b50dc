use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::AppState;

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": "voice-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub active_sessions: usize,
    pub websocket_connections: usize,
    pub upstream_configured: bool,
}

/// Live session counts and whether an upstream key is set.
///
/// A missing key does not make the service unhealthy: sessions still
/// upgrade and fail at the connect step.
pub async fn health_status(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        active_sessions: state.active_sessions(),
        websocket_connections: state.ws_connection_count(),
        upstream_configured: state.config.has_upstream_credentials(),
    })
}
