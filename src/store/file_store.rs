use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{normalize_id, DocumentStore};
use crate::error::SyncError;

/// Documents stored as files below a root directory.
///
/// Ids are relative paths (`notes/todo.md`). Anything that would resolve
/// outside the root is refused.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let root = root.into();
        if let Err(e) = tokio::fs::create_dir_all(&root).await {
            error!("Failed to create files directory {}: {}", root.display(), e);
            return Err(SyncError::persistence(&root.display().to_string(), e));
        }
        info!("File store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a document id to its path below the root.
    pub fn resolve(&self, id: &str) -> Result<PathBuf, SyncError> {
        Ok(self.root.join(normalize_id(id)?))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn read(&self, id: &str) -> Result<Option<String>, SyncError> {
        let path = self.resolve(id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Read document {} ({} bytes)", id, content.len());
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Document {} not found on disk", id);
                Ok(None)
            }
            Err(e) => {
                error!("Failed to read document {}: {}", id, e);
                Err(SyncError::persistence(id, e))
            }
        }
    }

    async fn modified_at(&self, id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        let path = self.resolve(id)?;
        match tokio::fs::metadata(&path).await.and_then(|meta| meta.modified()) {
            Ok(modified) => Ok(Some(DateTime::<Utc>::from(modified))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::persistence(id, e)),
        }
    }

    async fn write(&self, id: &str, content: &str) -> Result<(), SyncError> {
        let path = self.resolve(id)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();

        // 1. Make sure the directory for the document exists
        if let Err(e) = tokio::fs::create_dir_all(&parent).await {
            error!("Failed to create directory for document {}: {}", id, e);
            return Err(SyncError::persistence(id, e));
        }

        // 2. Write a hidden sibling first so readers never see a torn file
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, content.as_bytes()).await {
            error!("Failed to write temp file for document {}: {}", id, e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::persistence(id, e));
        }

        // 3. Swap it into place
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            error!("Failed to move document {} into place: {}", id, e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::persistence(id, e));
        }

        debug!("Wrote document {} ({} bytes)", id, content.len());
        Ok(())
    }
}
