//! Editor-side sync client.
//!
//! [`machine`] holds the rules, [`driver`] runs them against timers and the
//! [`transport`], and [`cache`] keeps unsaved work across restarts.

pub mod cache;
pub mod driver;
pub mod machine;
pub mod transport;

use std::time::Duration;

pub use cache::{FileUnsavedCache, MemoryUnsavedCache, UnsavedCache};
pub use driver::{spawn_client, spawn_driver, SyncHandle};
pub use machine::{ClientView, Effect, SyncMachine, SyncStatus};
pub use transport::TransportEvent;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:4000/ws`
    pub server_url: String,
    pub document_id: String,
    /// Quiet period after the last edit before it is submitted
    pub debounce: Duration,
    /// How long a submission may wait for its ack
    pub submit_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:4000/ws".to_string(),
            document_id: "example.md".to_string(),
            debounce: Duration::from_millis(2000),
            submit_timeout: Duration::from_millis(2000),
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}
