use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::warn;

use super::{normalize_id, DocumentStore};
use crate::error::SyncError;

/// In-memory store with switchable write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a write.
    pub fn with_document(self, id: &str, content: &str) -> Self {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(id.to_string(), content.to_string());
        }
        self
    }

    /// Make every following write fail like a full disk would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current content without going through the async trait.
    pub fn get(&self, id: &str) -> Option<String> {
        self.docs.read().ok().and_then(|docs| docs.get(id).cloned())
    }

    /// Change a document behind the sessions' back, as an external editor would.
    pub fn put_external(&self, id: &str, content: &str) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(id.to_string(), content.to_string());
        }
    }
}

fn poisoned(id: &str) -> SyncError {
    SyncError::persistence(
        id,
        std::io::Error::new(std::io::ErrorKind::Other, "memory store lock poisoned"),
    )
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, id: &str) -> Result<Option<String>, SyncError> {
        let key = normalize_id(id)?;
        let docs = self.docs.read().map_err(|_| poisoned(id))?;
        Ok(docs.get(&key).cloned())
    }

    async fn write(&self, id: &str, content: &str) -> Result<(), SyncError> {
        let key = normalize_id(id)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            warn!("Induced write failure for document {}", id);
            return Err(SyncError::persistence(
                id,
                std::io::Error::new(std::io::ErrorKind::Other, "induced write failure"),
            ));
        }
        let mut docs = self.docs.write().map_err(|_| poisoned(id))?;
        docs.insert(key, content.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn induced_failures_leave_content_untouched() {
        let store = MemoryStore::new().with_document("x", "before");

        store.set_fail_writes(true);
        assert!(matches!(
            store.write("x", "after").await,
            Err(SyncError::Persistence { .. })
        ));
        assert_eq!(store.get("x").as_deref(), Some("before"));
        assert_eq!(store.write_count(), 0);

        store.set_fail_writes(false);
        store.write("x", "after").await.unwrap();
        assert_eq!(store.read("x").await.unwrap().as_deref(), Some("after"));
        assert_eq!(store.write_count(), 1);
    }
}
