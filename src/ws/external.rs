use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::registry::SessionRegistry;
use crate::store::watcher::ExternalChange;

/// Feed externally made changes into the broadcast path.
///
/// Events are debounced per document: a burst of notifications for one id
/// results in a single reload once the id has been quiet for `debounce`.
pub fn spawn_external_change_listener(
    registry: Arc<SessionRegistry>,
    mut rx: mpsc::Receiver<ExternalChange>,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("External change listener started (debounce {:?})", debounce);
        let mut pending: HashMap<String, Instant> = HashMap::new();
        let mut closed = false;

        while !(closed && pending.is_empty()) {
            let next_due = pending.values().min().copied();

            tokio::select! {
                event = rx.recv(), if !closed => match event {
                    Some(ExternalChange { id }) => {
                        debug!("External change queued for {}", id);
                        pending.insert(id, Instant::now() + debounce);
                    }
                    None => closed = true,
                },
                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    let now = Instant::now();
                    let due: Vec<String> = pending
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in due {
                        pending.remove(&id);
                        apply(&registry, &id).await;
                    }
                }
            }
        }
        info!("External change listener stopped");
    })
}

async fn apply(registry: &SessionRegistry, id: &str) {
    let Some(session) = registry.get(id).await else {
        debug!("No active session for {}, ignoring external change", id);
        return;
    };
    match session.reload_from_store().await {
        Ok(Some(doc)) => info!("Broadcast external change for {} (version {})", id, doc.version),
        Ok(None) => debug!("External change for {} matched session content", id),
        Err(e) => error!("Failed to reload {} after external change: {}", id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_broadcast() {
        let store = Arc::new(MemoryStore::new().with_document("x", "a"));
        let registry = Arc::new(SessionRegistry::new(store.clone(), 16));
        let mut sub = registry.subscribe("x", Uuid::new_v4()).await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        let handle = spawn_external_change_listener(registry.clone(), rx, Duration::from_millis(200));

        store.put_external("x", "b");
        for _ in 0..5 {
            tx.send(ExternalChange { id: "x".into() }).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        store.put_external("x", "c");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let msg = sub.receiver.recv().await.unwrap();
        assert_eq!(msg.document.content, "c");
        assert_eq!(msg.document.version, 1);
        assert!(sub.receiver.try_recv().is_err());

        drop(tx);
        handle.await.unwrap();
    }
}
