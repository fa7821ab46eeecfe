use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::messages::DocumentMessage;

/// Authoritative state of one document.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Incremented on every persisted change.
    pub version: u64,
    /// Last write to the store. `None` for a document that was never
    /// written, or when the store keeps no timestamps.
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn to_message(&self) -> DocumentMessage {
        DocumentMessage {
            id: self.id.clone(),
            content: self.content.clone(),
            version: self.version,
        }
    }
}

/// Query for reading a document
#[derive(Deserialize, IntoParams, Debug)]
pub struct DocumentQuery {
    /// Document id (relative path)
    pub id: Option<String>,
}

/// Request for writing a document from outside the sync transport
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DocumentWriteRequest {
    pub id: Option<String>,
    pub content: Option<String>,
}

/// Response for a document write
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DocumentWriteResponse {
    pub success: bool,
    pub version: u64,
}
