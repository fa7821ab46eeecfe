use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every HTTP handler
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}
