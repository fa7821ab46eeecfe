//! Reconnecting WebSocket link from an editor to the sync server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::models::{ClientMessage, ServerMessage};

/// What the transport reports to the client driver.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
}

enum LinkEnd {
    Lost,
    Shutdown,
}

/// Keep a connection to `url` alive until the outgoing sender is dropped.
///
/// Frames queued while there is no connection are dropped; the driver's
/// submission timeout covers them.
pub fn spawn_transport(
    url: String,
    reconnect_delay: Duration,
    mut outgoing: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("Connected to {}", url);
                    if events.send(TransportEvent::Connected).await.is_err() {
                        return;
                    }

                    match run_link(ws_stream, &mut outgoing, &events).await {
                        LinkEnd::Shutdown => return,
                        LinkEnd::Lost => {
                            warn!("Connection to {} lost", url);
                            if events.send(TransportEvent::Disconnected).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => debug!("Failed to connect to {}: {}", url, e),
            }

            // Wait before reconnecting, discarding anything sent meanwhile
            let delay = tokio::time::sleep(reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    msg = outgoing.recv() => match msg {
                        Some(msg) => warn!("Offline, dropping {:?}", msg),
                        None => return,
                    },
                }
            }
        }
    })
}

async fn run_link(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outgoing: &mut mpsc::Receiver<ClientMessage>,
    events: &mpsc::Sender<TransportEvent>,
) -> LinkEnd {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            msg = outgoing.recv() => {
                let Some(msg) = msg else {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize {:?}: {}", msg, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!("Failed to send frame: {}", e);
                    return LinkEnd::Lost;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(msg) => {
                            if events.send(TransportEvent::Message(msg)).await.is_err() {
                                return LinkEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!("Unparseable frame from server: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return LinkEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return LinkEnd::Lost;
                }
            }
        }
    }
}
