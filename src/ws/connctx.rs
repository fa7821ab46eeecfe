use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle of one transport link on the server side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Subscribed(String),
    Disconnected,
}

#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub connection_id: Uuid,
    pub state: ConnState,
    pub connected_at: DateTime<Utc>,
}

impl ConnCtx {
    pub fn new() -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            state: ConnState::Connected,
            connected_at: Utc::now(),
        }
    }

    pub fn subscribed(&self) -> Option<&str> {
        match &self.state {
            ConnState::Subscribed(id) => Some(id.as_str()),
            _ => None,
        }
    }

    /// Move to `Subscribed(id)`. Returns the document that was left, if the
    /// connection switched away from another one.
    pub fn on_subscribe(&mut self, id: &str) -> Option<String> {
        match std::mem::replace(&mut self.state, ConnState::Subscribed(id.to_string())) {
            ConnState::Subscribed(prev) if prev != id => Some(prev),
            _ => None,
        }
    }

    /// Move to `Disconnected`. Returns the document to unsubscribe from.
    pub fn on_disconnect(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, ConnState::Disconnected) {
            ConnState::Subscribed(id) => Some(id),
            _ => None,
        }
    }
}

impl Default for ConnCtx {
    fn default() -> Self {
        Self::new()
    }
}
