use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for the liveness probe
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// API response for the readiness probe
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ReadyResponse {
    pub status: String,
    /// Whether the document store answered a probe read
    pub store_ok: bool,
    pub active_sessions: u32,
}
