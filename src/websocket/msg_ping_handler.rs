use chrono::Utc;
use tracing::debug;

use crate::models::{PongMessage, ServerMessage};
use crate::websocket::handler::ConnHandle;

/// Handle `ping` - reply with a pong carrying the server time
pub async fn handle_ping_message(conn: &ConnHandle) {
    debug!("Ping received from connection {}", conn.ctx.connection_id);
    conn.send(ServerMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() }))
        .await;
}
