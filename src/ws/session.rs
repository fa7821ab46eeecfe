use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::Document;
use crate::store::DocumentStore;

/// A persisted change, fanned out to every subscriber of the document.
#[derive(Clone, Debug)]
pub struct BroadcastMessage {
    /// Connection that submitted the change, `None` for external writers.
    pub sender_id: Option<Uuid>,
    pub document: Document,
}

#[derive(Debug)]
struct DocState {
    content: String,
    version: u64,
    last_saved_at: Option<DateTime<Utc>>,
}

impl DocState {
    fn to_document(&self, id: &str) -> Document {
        Document {
            id: id.to_string(),
            content: self.content.clone(),
            version: self.version,
            last_saved_at: self.last_saved_at,
        }
    }
}

/// Authoritative in-memory state of one document.
///
/// Every mutation takes `state`, writes the store while holding it and
/// broadcasts before releasing it, so for one document the apply order, the
/// persist order and the broadcast order are the same.
pub struct Session {
    id: String,
    store: Arc<dyn DocumentStore>,
    state: Mutex<Option<DocState>>,
    subscribers: StdMutex<HashSet<Uuid>>,
    tx: broadcast::Sender<BroadcastMessage>,
    last_activity: StdMutex<Instant>,
}

impl Session {
    pub(crate) fn new(id: &str, store: Arc<dyn DocumentStore>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<BroadcastMessage>(capacity.max(1));
        Self {
            id: id.to_string(),
            store,
            state: Mutex::new(None),
            subscribers: StdMutex::new(HashSet::new()),
            tx,
            last_activity: StdMutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fill the slot from the store on first access. A missing document is empty
    /// and has never been saved.
    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<DocState>,
    ) -> Result<&'a mut DocState, SyncError> {
        match *slot {
            Some(ref mut state) => Ok(state),
            None => {
                let (content, last_saved_at) = match self.store.read(&self.id).await? {
                    Some(content) => {
                        let modified = self.store.modified_at(&self.id).await.unwrap_or_else(|e| {
                            warn!("No modification time for {}: {}", self.id, e);
                            None
                        });
                        (content, modified)
                    }
                    None => (String::new(), None),
                };
                info!("Loaded document {} into session ({} bytes)", self.id, content.len());
                Ok(slot.insert(DocState {
                    content,
                    version: 0,
                    last_saved_at,
                }))
            }
        }
    }

    /// Current authoritative document.
    pub async fn snapshot(&self) -> Result<Document, SyncError> {
        let mut guard = self.state.lock().await;
        let state = self.ensure_loaded(&mut guard).await?;
        self.touch();
        Ok(state.to_document(&self.id))
    }

    /// Replace the content, persist it and broadcast it.
    ///
    /// On a store failure the in-memory content stays at the last persisted
    /// value and nothing is broadcast.
    pub async fn submit(
        &self,
        sender_id: Option<Uuid>,
        content: String,
        base_version: Option<u64>,
        reject_stale: bool,
    ) -> Result<Document, SyncError> {
        let mut guard = self.state.lock().await;
        let state = self.ensure_loaded(&mut guard).await?;
        self.touch();

        if reject_stale {
            if let Some(base) = base_version {
                if base != state.version {
                    warn!(
                        "Rejecting stale submission for {}: based on {}, current {}",
                        self.id, base, state.version
                    );
                    return Err(SyncError::Conflict {
                        expected: base,
                        actual: state.version,
                    });
                }
            }
        }

        if let Err(e) = self.store.write(&self.id, &content).await {
            error!("Failed to persist document {}: {}", self.id, e);
            return Err(e);
        }

        state.content = content;
        state.version += 1;
        state.last_saved_at = Some(Utc::now());
        let document = state.to_document(&self.id);
        debug!("Document {} persisted at version {}", self.id, document.version);

        // No receivers is fine: nobody else is watching this document.
        let _ = self.tx.send(BroadcastMessage {
            sender_id,
            document: document.clone(),
        });
        Ok(document)
    }

    /// Pick up a change made to the store by someone other than this session.
    ///
    /// Returns the new document when the content differed and was broadcast.
    pub async fn reload_from_store(&self) -> Result<Option<Document>, SyncError> {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            // Never loaded: the next load reads the store anyway.
            return Ok(None);
        };

        let content = match self.store.read(&self.id).await? {
            Some(content) => content,
            None => {
                warn!("Document {} disappeared from the store, keeping session content", self.id);
                return Ok(None);
            }
        };
        if content == state.content {
            return Ok(None);
        }

        state.content = content;
        state.version += 1;
        state.last_saved_at = Some(Utc::now());
        let document = state.to_document(&self.id);
        info!("External change picked up for {} (version {})", self.id, document.version);
        self.touch();

        let _ = self.tx.send(BroadcastMessage {
            sender_id: None,
            document: document.clone(),
        });
        Ok(Some(document))
    }

    /// Register a connection and hand back its broadcast receiver.
    pub fn add_subscriber(&self, connection_id: Uuid) -> broadcast::Receiver<BroadcastMessage> {
        let rx = self.tx.subscribe();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection_id);
        self.touch();
        rx
    }

    /// Returns whether the connection was subscribed.
    pub fn remove_subscriber(&self, connection_id: &Uuid) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(connection_id);
        self.touch();
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }
}
