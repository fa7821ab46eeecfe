use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{BroadcastMessage, Session};
use crate::error::SyncError;
use crate::models::Document;
use crate::store::{normalize_id, DocumentStore};

/// What a connection gets back when it subscribes to a document.
pub struct Subscription {
    pub session: Arc<Session>,
    pub document: Document,
    pub receiver: broadcast::Receiver<BroadcastMessage>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: u32,
    pub idle_sessions: u32,
    pub subscribers: u32,
}

/// Process-wide map from document id to its session.
///
/// At most one session exists per id; all content mutation for an id goes
/// through that session. The map lock is only held for lookups and inserts.
pub struct SessionRegistry {
    store: Arc<dyn DocumentStore>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    broadcast_capacity: usize,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, broadcast_capacity: usize) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            broadcast_capacity,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Session for `id`, created if no session is active. Content is loaded
    /// from the store on first use of the session, not here.
    ///
    /// The id is normalized first, so every spelling of one path shares one
    /// session; ids outside the files root never get a session.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Session>, SyncError> {
        let id = normalize_id(id)?;

        if let Some(session) = self.sessions.read().await.get(&id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                info!("Creating session for document {}", id);
                Arc::new(Session::new(&id, self.store.clone(), self.broadcast_capacity))
            })
            .clone();
        Ok(session)
    }

    /// Active session for `id`, if any.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let id = normalize_id(id).ok()?;
        self.sessions.read().await.get(&id).cloned()
    }

    /// Subscribe a connection and return the document as it is right now.
    ///
    /// The receiver is registered before the snapshot is taken so no change
    /// committed in between can be missed.
    pub async fn subscribe(&self, id: &str, connection_id: Uuid) -> Result<Subscription, SyncError> {
        let session = self.get_or_create(id).await?;
        let receiver = session.add_subscriber(connection_id);
        let document = match session.snapshot().await {
            Ok(document) => document,
            Err(e) => {
                session.remove_subscriber(&connection_id);
                return Err(e);
            }
        };
        debug!(
            "Connection {} subscribed to {} ({} subscribers)",
            connection_id,
            id,
            session.subscriber_count()
        );
        Ok(Subscription {
            session,
            document,
            receiver,
        })
    }

    /// The session stays registered with zero subscribers until reaped.
    pub async fn unsubscribe(&self, id: &str, connection_id: Uuid) {
        if let Some(session) = self.get(id).await {
            if session.remove_subscriber(&connection_id) {
                debug!(
                    "Connection {} unsubscribed from {} ({} subscribers left)",
                    connection_id,
                    id,
                    session.subscriber_count()
                );
            }
        }
    }

    pub async fn current_content(&self, id: &str) -> Result<String, SyncError> {
        Ok(self.document(id).await?.content)
    }

    pub async fn document(&self, id: &str) -> Result<Document, SyncError> {
        self.get_or_create(id).await?.snapshot().await
    }

    /// Drop sessions nobody uses any more. Returns how many were removed.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        // strong_count == 1: no connection or in-flight submission holds it.
        sessions.retain(|_, session| {
            !(session.subscriber_count() == 0
                && session.idle_for() >= max_idle
                && Arc::strong_count(session) == 1)
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            info!("Reaped {} idle sessions, {} remain", reaped, sessions.len());
        }
        reaped
    }

    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let mut stats = RegistryStats::default();
        for session in sessions.values() {
            let n = session.subscriber_count() as u32;
            stats.sessions += 1;
            stats.subscribers += n;
            if n == 0 {
                stats.idle_sessions += 1;
            }
        }
        stats
    }
}
