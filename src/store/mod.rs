//! Durable id → text storage.
//!
//! The store is the durable mirror of the in-memory sessions, never a second
//! writer: every write for an active document goes through its session.

pub mod file_store;
pub mod memory_store;
pub mod watcher;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;

/// Whole-document read/write storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. `Ok(None)` when the document does not exist.
    async fn read(&self, id: &str) -> Result<Option<String>, SyncError>;

    /// Overwrite a document, creating any intermediate structure for the id.
    async fn write(&self, id: &str, content: &str) -> Result<(), SyncError>;

    /// When the stored document was last written, if the store knows.
    async fn modified_at(&self, _id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(None)
    }
}

/// Canonical form of a document id: its `/`-separated path segments with
/// empty and `.` segments dropped.
///
/// Every spelling of the same file (`note.md`, `./note.md`, `note.md/`) maps to
/// one id, which is what sessions are keyed by. Absolute ids and `..` segments
/// are rejected.
pub fn normalize_id(id: &str) -> Result<String, SyncError> {
    if id.trim().is_empty() {
        return Err(SyncError::Validation("document id required".to_string()));
    }
    if id.starts_with('/') {
        return Err(SyncError::Validation(format!("Invalid path '{}'", id)));
    }

    let mut segments = Vec::new();
    for segment in id.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(SyncError::Validation(format!("Invalid path '{}'", id))),
            _ => segments.push(segment),
        }
    }
    if segments.is_empty() {
        return Err(SyncError::Validation(format!("Invalid path '{}'", id)));
    }
    Ok(segments.join("/"))
}
