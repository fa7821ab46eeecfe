use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::debug;

use crate::models::{HealthResponse, ReadyResponse};
use crate::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint - probes the document store
pub async fn ready_check(State(app_state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    debug!("Readiness check requested");
    let store_ok = app_state.registry.store().read(".ready-probe").await.is_ok();
    let active_sessions = app_state.registry.stats().await.sessions;
    Json(ReadyResponse {
        status: if store_ok { "ok" } else { "degraded" }.to_string(),
        store_ok,
        active_sessions,
    })
}
