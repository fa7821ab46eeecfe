use axum::{http::StatusCode, Json};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Errors raised by the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The link to the peer failed (connect, send, closed socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store could not read or write a document.
    #[error("persistence error for document '{id}': {source}")]
    Persistence {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// The request was malformed (missing id, path escaping the root, bad frame).
    #[error("validation error: {0}")]
    Validation(String),

    /// The submission was based on an outdated version of the document.
    #[error("version conflict: expected {expected}, document is at {actual}")]
    Conflict { expected: u64, actual: u64 },
}

impl SyncError {
    pub fn persistence(id: &str, source: std::io::Error) -> Self {
        SyncError::Persistence {
            id: id.to_string(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Transport(_) => StatusCode::BAD_GATEWAY,
            SyncError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Convert into the error shape returned by the HTTP handlers.
    pub fn into_response(self) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.status_code();
        error!("Request failed: {}", self);
        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: self.to_string(),
            }),
        )
    }
}
