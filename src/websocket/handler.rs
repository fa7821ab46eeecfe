use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Path, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{ClientMessage, ErrorMessage, ServerMessage};
use crate::websocket::msg_load_handler::{handle_load_message, subscribe};
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_update_handler::handle_update_message;
use crate::ws::connctx::ConnCtx;
use crate::ws::Session;
use crate::AppState;

/// Per-connection state owned by the reader loop.
pub struct ConnHandle {
    pub ctx: ConnCtx,
    /// Frames queued for the writer task
    pub out: mpsc::Sender<ServerMessage>,
    /// Session of the subscribed document
    pub session: Option<Arc<Session>>,
    /// Task forwarding that session's broadcasts to this connection
    pub forwarder: Option<JoinHandle<()>>,
}

impl ConnHandle {
    pub async fn send(&self, msg: ServerMessage) {
        if self.out.send(msg).await.is_err() {
            debug!("Writer for connection {} is gone, dropping frame", self.ctx.connection_id);
        }
    }

    pub async fn send_error(&self, message: String) {
        self.send(ServerMessage::Error(ErrorMessage { message })).await;
    }
}

/// Decrements the live connection count when the socket task ends.
struct ConnectionCount(Arc<AppState>);

impl Drop for ConnectionCount {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// WebSocket handler for `/ws`; subscribes to the default document if one is configured
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    let document_id = app_state.config.default_document.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, document_id, app_state))
}

/// WebSocket handler for `/ws/{*document_id}`
pub async fn websocket_document_handler(
    Path(document_id): Path<String>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt for document {}", document_id);
    ws.on_upgrade(move |socket| handle_socket(socket, Some(document_id), app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, document_id: Option<String>, app_state: Arc<AppState>) {
    app_state.connections.fetch_add(1, Ordering::SeqCst);
    let _count = ConnectionCount(app_state.clone());

    let ctx = ConnCtx::new();
    let connection_id = ctx.connection_id;
    info!("WebSocket connection established with connection_id: {}", connection_id);

    // Split the socket; only the writer task touches the sink
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize frame for connection {}: {}", connection_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut conn = ConnHandle {
        ctx,
        out: out_tx,
        session: None,
        forwarder: None,
    };

    // Auto-subscribe and push the initial content
    if let Some(id) = document_id {
        match subscribe(&mut conn, &app_state, &id).await {
            Ok(document) => conn.send(ServerMessage::LoadDocument(document.to_message())).await,
            Err(e) => {
                error!("Failed to auto-subscribe connection {} to {}: {}", connection_id, id, e);
                conn.send_error(e.to_string()).await;
            }
        }
    }

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Parse the incoming message as JSON
                    let msg: ClientMessage = match serde_json::from_str(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!("Malformed frame from connection {}: {}", connection_id, e);
                            conn.send_error(format!("Malformed message: {}", e)).await;
                            continue;
                        }
                    };

                    // Handlers run to completion here, so a write that was
                    // started is never cancelled by the socket closing.
                    match msg {
                        ClientMessage::RequestDocument(load_msg) => {
                            handle_load_message(&load_msg, &mut conn, &app_state).await;
                        }
                        ClientMessage::SendChanges(update_msg) => {
                            handle_update_message(update_msg, &mut conn, &app_state).await;
                        }
                        ClientMessage::Ping => {
                            handle_ping_message(&conn).await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket error on connection {}: {}", connection_id, e);
                    break;
                }
            },
            _ = &mut send_task => {
                debug!("Writer for connection {} finished", connection_id);
                break;
            }
        }
    }

    // Stop broadcasts to this connection and leave the document
    if let Some(forwarder) = conn.forwarder.take() {
        forwarder.abort();
    }
    if let Some(id) = conn.ctx.on_disconnect() {
        app_state.registry.unsubscribe(&id, connection_id).await;
    }
    info!("WebSocket connection {} terminated", connection_id);
}
