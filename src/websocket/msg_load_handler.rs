use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{Document, RequestDocumentMessage, ServerMessage};
use crate::websocket::handler::ConnHandle;
use crate::ws::{BroadcastMessage, Session};
use crate::AppState;

/// Handle `request-document`: subscribe and push the current content to this connection only.
pub async fn handle_load_message(load_msg: &RequestDocumentMessage, conn: &mut ConnHandle, app_state: &AppState) {
    info!("Load requested for document {} by connection {}", load_msg.id, conn.ctx.connection_id);

    match subscribe(conn, app_state, &load_msg.id).await {
        Ok(document) => conn.send(ServerMessage::LoadDocument(document.to_message())).await,
        Err(e) => {
            error!("Failed to load document {}: {}", load_msg.id, e);
            conn.send_error(e.to_string()).await;
        }
    }
}

/// Subscribe the connection to `id`, leaving any other document it was on.
pub async fn subscribe(conn: &mut ConnHandle, app_state: &AppState, id: &str) -> Result<Document, SyncError> {
    let connection_id = conn.ctx.connection_id;
    let sub = app_state.registry.subscribe(id, connection_id).await?;

    // The session id is the normalized spelling of `id`
    let id = sub.session.id();
    if let Some(previous) = conn.ctx.on_subscribe(id) {
        info!("Connection {} switching from {} to {}", connection_id, previous, id);
        app_state.registry.unsubscribe(&previous, connection_id).await;
    }
    if let Some(forwarder) = conn.forwarder.take() {
        forwarder.abort();
    }

    conn.forwarder = Some(spawn_forwarder(
        connection_id,
        sub.receiver,
        sub.session.clone(),
        conn.out.clone(),
    ));
    conn.session = Some(sub.session);
    Ok(sub.document)
}

/// Relay a session's broadcasts to one connection, skipping its own changes.
fn spawn_forwarder(
    connection_id: Uuid,
    mut rx: tokio::sync::broadcast::Receiver<BroadcastMessage>,
    session: Arc<Session>,
    out: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    // Too far behind to replay; resend the whole document instead.
                    warn!("Connection {} lagged {} changes on {}, resyncing", connection_id, skipped, session.id());
                    match session.snapshot().await {
                        Ok(document) => {
                            if out.send(ServerMessage::LoadDocument(document.to_message())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to resync connection {}: {}", connection_id, e),
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            // Skip messages from this connection to prevent echo
            if msg.sender_id == Some(connection_id) {
                continue;
            }

            debug!("Forwarding {} v{} to connection {}", msg.document.id, msg.document.version, connection_id);
            if out.send(ServerMessage::ReceiveChanges(msg.document.to_message())).await.is_err() {
                break;
            }
        }
    })
}
