//! Async driver running a [`SyncMachine`] against real timers and a transport.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::UnsavedCache;
use super::machine::{ClientView, Effect, SyncMachine};
use super::transport::{spawn_transport, TransportEvent};
use super::ClientConfig;
use crate::error::SyncError;
use crate::models::ClientMessage;

enum Command {
    Edit(String),
    Flush,
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running sync client.
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ClientView>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Replace the local content; it is saved once editing pauses.
    pub async fn edit(&self, content: impl Into<String>) -> Result<(), SyncError> {
        self.command(Command::Edit(content.into())).await
    }

    /// Submit unsaved content right away, e.g. before the editor closes.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.command(Command::Flush).await
    }

    async fn command(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::Transport("sync client stopped".to_string()))
    }

    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ClientView) -> bool,
    ) -> Result<ClientView, SyncError> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::Transport("sync client stopped".to_string()))?;
        Ok(view.clone())
    }

    /// Stop the client and its transport. Unsaved content stays in the cache.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.task.await;
    }
}

/// Start a client: restore the unsaved cache, connect, and begin syncing.
pub async fn spawn_client(
    config: ClientConfig,
    cache: Arc<dyn UnsavedCache>,
) -> Result<SyncHandle, SyncError> {
    let restored = cache.load().await?;
    if restored.is_some() {
        info!("Restored unsaved changes for {}", config.document_id);
    }
    let machine = SyncMachine::new(config.document_id.clone(), restored);

    let (out_tx, out_rx) = mpsc::channel::<ClientMessage>(64);
    let (ev_tx, ev_rx) = mpsc::channel::<TransportEvent>(64);
    spawn_transport(config.server_url.clone(), config.reconnect_delay, out_rx, ev_tx);

    Ok(spawn_driver(config, machine, cache, out_tx, ev_rx))
}

/// Run the control loop over an already wired transport.
pub fn spawn_driver(
    config: ClientConfig,
    machine: SyncMachine,
    cache: Arc<dyn UnsavedCache>,
    outgoing: mpsc::Sender<ClientMessage>,
    events: mpsc::Receiver<TransportEvent>,
) -> SyncHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (view_tx, view_rx) = watch::channel(machine.view());

    let driver = Driver {
        config,
        machine,
        cache,
        outgoing,
        view: view_tx,
        debounce_at: None,
        timeout_at: None,
    };
    let task = tokio::spawn(driver.run(cmd_rx, events));

    SyncHandle {
        commands: cmd_tx,
        view: view_rx,
        task,
    }
}

struct Driver {
    config: ClientConfig,
    machine: SyncMachine,
    cache: Arc<dyn UnsavedCache>,
    outgoing: mpsc::Sender<ClientMessage>,
    view: watch::Sender<ClientView>,
    debounce_at: Option<Instant>,
    timeout_at: Option<(u64, Instant)>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        info!("Sync client started for {}", self.config.document_id);
        let mut shutdown: Option<oneshot::Sender<()>> = None;

        loop {
            let debounce_at = self.debounce_at;
            let timeout_at = self.timeout_at;

            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Edit(content)) => self.machine.local_edit(content),
                    Some(Command::Flush) => self.machine.flush(),
                    Some(Command::Shutdown(done)) => {
                        shutdown = Some(done);
                        break;
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => self.machine.connected(),
                    Some(TransportEvent::Disconnected) => self.machine.disconnected(),
                    Some(TransportEvent::Message(msg)) => self.machine.server_message(&msg),
                    None => {
                        warn!("Transport for {} stopped", self.config.document_id);
                        break;
                    }
                },
                _ = tokio::time::sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                    self.debounce_at = None;
                    self.machine.debounce_elapsed()
                },
                _ = tokio::time::sleep_until(timeout_at.map(|(_, at)| at).unwrap_or_else(Instant::now)), if timeout_at.is_some() => {
                    self.timeout_at = None;
                    match timeout_at {
                        Some((seq, _)) => self.machine.submit_timeout(seq),
                        None => Vec::new(),
                    }
                },
            };

            self.apply(effects).await;
            self.view.send_replace(self.machine.view());
        }

        info!("Sync client for {} stopped", self.config.document_id);
        if let Some(done) = shutdown {
            let _ = done.send(());
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PersistUnsaved(content) => {
                    if let Err(e) = self.cache.store(&content).await {
                        warn!("Failed to persist unsaved changes: {}", e);
                    }
                }
                Effect::ClearUnsaved => {
                    if let Err(e) = self.cache.clear().await {
                        warn!("Failed to clear unsaved cache: {}", e);
                    }
                }
                Effect::ArmDebounce => {
                    self.debounce_at = Some(Instant::now() + self.config.debounce);
                }
                Effect::CancelDebounce => self.debounce_at = None,
                Effect::Send(msg) => {
                    debug!("Sending {:?}", msg);
                    if self.outgoing.send(msg).await.is_err() {
                        warn!("Transport closed, frame dropped");
                    }
                }
                Effect::ArmSubmitTimeout(seq) => {
                    self.timeout_at = Some((seq, Instant::now() + self.config.submit_timeout));
                }
                Effect::CancelSubmitTimeout => self.timeout_at = None,
            }
        }
    }
}
