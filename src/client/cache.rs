//! Durable copy of edits the server has not acknowledged yet.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::SyncError;

#[async_trait]
pub trait UnsavedCache: Send + Sync {
    /// Content left over from an earlier run, if any.
    async fn load(&self) -> Result<Option<String>, SyncError>;

    async fn store(&self, content: &str) -> Result<(), SyncError>;

    async fn clear(&self) -> Result<(), SyncError>;
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CachedEdit {
    document_id: String,
    content: String,
    saved_at: DateTime<Utc>,
}

/// Unsaved cache kept in a JSON file, surviving restarts of the editor.
#[derive(Debug, Clone)]
pub struct FileUnsavedCache {
    path: PathBuf,
    document_id: String,
}

impl FileUnsavedCache {
    pub fn new(path: impl Into<PathBuf>, document_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            document_id: document_id.into(),
        }
    }

    fn key(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl UnsavedCache for FileUnsavedCache {
    async fn load(&self) -> Result<Option<String>, SyncError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!("Failed to read unsaved cache {}: {}", self.path.display(), e);
                return Err(SyncError::persistence(&self.key(), e));
            }
        };

        let cached: CachedEdit = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                error!("Unsaved cache {} is unreadable: {}", self.path.display(), e);
                return Err(SyncError::Validation(format!("Corrupt unsaved cache: {}", e)));
            }
        };
        if cached.document_id != self.document_id {
            debug!(
                "Unsaved cache belongs to {}, not {}; ignoring",
                cached.document_id, self.document_id
            );
            return Ok(None);
        }
        debug!("Restored unsaved edit saved at {}", cached.saved_at);
        Ok(Some(cached.content))
    }

    async fn store(&self, content: &str) -> Result<(), SyncError> {
        let cached = CachedEdit {
            document_id: self.document_id.clone(),
            content: content.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string(&cached)
            .map_err(|e| SyncError::Validation(format!("Failed to encode unsaved cache: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::persistence(&self.key(), e))?;
            }
        }

        // Write then rename so a crash never leaves half a cache behind.
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::persistence(&self.key(), e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::persistence(&self.key(), e));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), SyncError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::persistence(&self.key(), e)),
        }
    }
}

/// Unsaved cache that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryUnsavedCache {
    content: Mutex<Option<String>>,
}

impl MemoryUnsavedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: &str) -> Self {
        Self {
            content: Mutex::new(Some(content.to_string())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.content.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl UnsavedCache for MemoryUnsavedCache {
    async fn load(&self) -> Result<Option<String>, SyncError> {
        Ok(self.contents())
    }

    async fn store(&self, content: &str) -> Result<(), SyncError> {
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SyncError> {
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
