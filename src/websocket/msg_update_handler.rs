use tracing::{error, info};

use crate::models::{AckMessage, SendChangesMessage, ServerMessage};
use crate::store::normalize_id;
use crate::websocket::handler::ConnHandle;
use crate::websocket::msg_load_handler::subscribe;
use crate::AppState;

/// Handle `send-changes` - apply, persist, ack, broadcast
pub async fn handle_update_message(update_msg: SendChangesMessage, conn: &mut ConnHandle, app_state: &AppState) {
    let connection_id = conn.ctx.connection_id;
    info!(
        "Changes received for document {} from connection {} (request {}, {} bytes)",
        update_msg.id,
        connection_id,
        update_msg.request_id,
        update_msg.content.len()
    );

    let request_id = update_msg.request_id;
    let nack = |message: String| {
        ServerMessage::SendChangesAck(AckMessage {
            request_id,
            success: false,
            message: Some(message),
            version: None,
        })
    };

    // 1. A reconnecting client submits before it requests; subscribe it first
    let target = normalize_id(&update_msg.id).ok();
    if target.is_none() || conn.ctx.subscribed() != target.as_deref() {
        if let Err(e) = subscribe(conn, app_state, &update_msg.id).await {
            error!("Failed to subscribe connection {} to {}: {}", connection_id, update_msg.id, e);
            conn.send(nack(e.to_string())).await;
            return;
        }
    }
    let Some(session) = conn.session.clone() else {
        conn.send(nack("Not subscribed to a document".to_string())).await;
        return;
    };

    // 2. Persist through the session; the session broadcasts on success
    let result = session
        .submit(
            Some(connection_id),
            update_msg.content,
            update_msg.base_version,
            app_state.config.reject_stale_versions,
        )
        .await;

    // 3. Ack the sender
    let ack = match result {
        Ok(document) => ServerMessage::SendChangesAck(AckMessage {
            request_id,
            success: true,
            message: None,
            version: Some(document.version),
        }),
        Err(e) => {
            error!("Failed to save document {}: {}", update_msg.id, e);
            nack(format!("Failed to save document: {}", e))
        }
    };
    conn.send(ack).await;
}
