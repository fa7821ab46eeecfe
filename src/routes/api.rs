use crate::{handlers::{diagnostics, doc_read, doc_write, health_check, ready_check}, AppState};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/document", get(doc_read).post(doc_write))
        .with_state(app_state)
}
