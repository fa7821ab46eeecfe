//! Client sync state machine.
//!
//! Plain data plus transition functions. Every transition returns the
//! [`Effect`]s the driver has to carry out (timers, cache writes, frames), so
//! the rules below are testable without a network or a clock.
//!
//! Rules that protect unsaved work:
//! - the unsaved cache is only cleared by a successful ack of exactly the
//!   content it holds;
//! - an ack only marks the editor `saved` when it answers the latest issued
//!   submission and nothing was typed since;
//! - pushed content never overwrites local edits that are not yet saved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{
    AckMessage, ClientMessage, DocumentMessage, RequestDocumentMessage, SendChangesMessage,
    ServerMessage,
};
use crate::store::normalize_id;

/// Sync indicator shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Edited locally, debounce window running
    Waiting,
    /// Submitted, waiting for the ack
    Saving,
    /// Local content matches what the server acknowledged or pushed
    Saved,
    /// Last submission failed or timed out; unsaved work is still cached
    Error,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PersistUnsaved(String),
    ClearUnsaved,
    ArmDebounce,
    CancelDebounce,
    Send(ClientMessage),
    ArmSubmitTimeout(u64),
    CancelSubmitTimeout,
}

/// A submission sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub seq: u64,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
}

/// Snapshot of the editor as seen by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    pub document_id: String,
    pub content: String,
    pub status: SyncStatus,
    pub online: bool,
    pub has_unsaved: bool,
    pub version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SyncMachine {
    document_id: String,
    content: String,
    status: SyncStatus,
    online: bool,
    /// Mirror of the durable unsaved cache
    unsaved: Option<String>,
    /// Last version the server confirmed or pushed
    version: Option<u64>,
    /// Last issued submission seq
    seq: u64,
    last_submission: Option<Submission>,
    awaiting_ack: bool,
    debounce_armed: bool,
    /// The debounce fired while a submission was in flight
    resubmit_pending: bool,
}

impl SyncMachine {
    /// New machine; `restored` is an unsaved cache found at startup.
    pub fn new(document_id: impl Into<String>, restored: Option<String>) -> Self {
        let (content, status) = match &restored {
            Some(content) => (content.clone(), SyncStatus::Waiting),
            None => (String::new(), SyncStatus::Saved),
        };
        // Pushes carry the server's canonical id
        let document_id = document_id.into();
        let document_id = normalize_id(&document_id).unwrap_or(document_id);
        Self {
            document_id,
            content,
            status,
            online: false,
            unsaved: restored,
            version: None,
            seq: 0,
            last_submission: None,
            awaiting_ack: false,
            debounce_armed: false,
            resubmit_pending: false,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn unsaved(&self) -> Option<&str> {
        self.unsaved.as_deref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn in_flight(&self) -> Option<&Submission> {
        if self.awaiting_ack {
            self.last_submission.as_ref()
        } else {
            None
        }
    }

    pub fn view(&self) -> ClientView {
        ClientView {
            document_id: self.document_id.clone(),
            content: self.content.clone(),
            status: self.status,
            online: self.online,
            has_unsaved: self.unsaved.is_some(),
            version: self.version,
        }
    }

    /// The user changed the text.
    pub fn local_edit(&mut self, content: String) -> Vec<Effect> {
        self.content = content.clone();
        self.unsaved = Some(content.clone());
        self.status = SyncStatus::Waiting;
        self.debounce_armed = true;
        vec![Effect::PersistUnsaved(content), Effect::ArmDebounce]
    }

    /// The quiet period after the last edit is over.
    pub fn debounce_elapsed(&mut self) -> Vec<Effect> {
        self.debounce_armed = false;
        let Some(content) = self.unsaved.clone() else {
            return Vec::new();
        };
        if self.awaiting_ack {
            debug!("Submission in flight, deferring newer content");
            self.resubmit_pending = true;
            return Vec::new();
        }
        self.submit(content)
    }

    /// Submit the unsaved content now, skipping the debounce window.
    pub fn flush(&mut self) -> Vec<Effect> {
        let Some(content) = self.unsaved.clone() else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        if self.debounce_armed {
            self.debounce_armed = false;
            effects.push(Effect::CancelDebounce);
        }
        if self.awaiting_ack {
            self.resubmit_pending = true;
            return effects;
        }
        effects.extend(self.submit(content));
        effects
    }

    fn submit(&mut self, content: String) -> Vec<Effect> {
        self.seq += 1;
        let seq = self.seq;
        info!("Submitting {} (seq {}, {} bytes)", self.document_id, seq, content.len());
        self.last_submission = Some(Submission {
            seq,
            content: content.clone(),
            submitted_at: Utc::now(),
        });
        self.awaiting_ack = true;
        self.resubmit_pending = false;
        self.status = SyncStatus::Saving;
        vec![
            Effect::Send(ClientMessage::SendChanges(SendChangesMessage {
                id: self.document_id.clone(),
                request_id: seq,
                content,
                base_version: self.version,
            })),
            Effect::ArmSubmitTimeout(seq),
        ]
    }

    /// Whatever happens to a submission, this decides what comes next.
    fn after_resolution(&mut self, acked_content: Option<&str>) -> Vec<Effect> {
        let newest = self.unsaved.clone();
        match (newest, acked_content) {
            // The acked content is still the newest: saved.
            (Some(newest), Some(acked)) if newest == acked => {
                self.unsaved = None;
                self.status = SyncStatus::Saved;
                vec![Effect::ClearUnsaved]
            }
            (None, Some(_)) => {
                self.status = SyncStatus::Saved;
                Vec::new()
            }
            // Newer edits exist: send them now if their debounce already fired.
            (Some(newest), _) if self.resubmit_pending => self.submit(newest),
            (Some(_), _) if self.debounce_armed => {
                self.status = SyncStatus::Waiting;
                Vec::new()
            }
            (_, _) => {
                self.status = SyncStatus::Error;
                Vec::new()
            }
        }
    }

    /// Reply to one of our submissions.
    pub fn ack(&mut self, ack: &AckMessage) -> Vec<Effect> {
        let Some(submission) = self.last_submission.clone() else {
            warn!("Ack for request {} without any submission", ack.request_id);
            return Vec::new();
        };
        if ack.request_id != submission.seq {
            debug!(
                "Ignoring ack for superseded request {} (latest {})",
                ack.request_id, submission.seq
            );
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.awaiting_ack {
            self.awaiting_ack = false;
            effects.push(Effect::CancelSubmitTimeout);
        }

        if ack.success {
            if let Some(version) = ack.version {
                self.version = Some(version);
            }
            info!("Request {} saved", ack.request_id);
            effects.extend(self.after_resolution(Some(&submission.content)));
        } else {
            warn!(
                "Request {} rejected: {}",
                ack.request_id,
                ack.message.as_deref().unwrap_or("no reason given")
            );
            effects.extend(self.after_resolution(None));
        }
        effects
    }

    /// No ack arrived in time for `seq`.
    pub fn submit_timeout(&mut self, seq: u64) -> Vec<Effect> {
        let current = self.last_submission.as_ref().map(|s| s.seq);
        if !self.awaiting_ack || current != Some(seq) {
            return Vec::new();
        }
        warn!("Request {} timed out", seq);
        self.awaiting_ack = false;
        self.after_resolution(None)
    }

    /// Transport link (re)established.
    pub fn connected(&mut self) -> Vec<Effect> {
        self.online = true;
        let mut effects = Vec::new();

        // A submission sent on the previous link will never be answered here.
        if self.awaiting_ack {
            self.awaiting_ack = false;
            effects.push(Effect::CancelSubmitTimeout);
        }

        match self.unsaved.clone() {
            Some(content) => {
                info!("Reconnected with unsaved changes, resubmitting");
                if self.debounce_armed {
                    self.debounce_armed = false;
                    effects.push(Effect::CancelDebounce);
                }
                effects.extend(self.submit(content));
            }
            None => {
                info!("Reconnected, requesting {}", self.document_id);
                effects.push(Effect::Send(ClientMessage::RequestDocument(
                    RequestDocumentMessage {
                        id: self.document_id.clone(),
                    },
                )));
            }
        }
        effects
    }

    /// Transport link lost. In-flight submissions resolve through their timeout.
    pub fn disconnected(&mut self) -> Vec<Effect> {
        self.online = false;
        Vec::new()
    }

    /// Content pushed by the server (`load-document` or `receive-changes`).
    ///
    /// Returns whether the local content was replaced.
    pub fn document_received(&mut self, doc: &DocumentMessage) -> bool {
        if doc.id != self.document_id {
            debug!("Ignoring push for other document {}", doc.id);
            return false;
        }
        if self.unsaved.is_some() || self.awaiting_ack {
            debug!("Keeping unsaved local content over pushed version {}", doc.version);
            return false;
        }
        self.content = doc.content.clone();
        self.version = Some(doc.version);
        self.status = SyncStatus::Saved;
        true
    }

    /// Route a server frame to the right transition.
    pub fn server_message(&mut self, msg: &ServerMessage) -> Vec<Effect> {
        match msg {
            ServerMessage::LoadDocument(doc) | ServerMessage::ReceiveChanges(doc) => {
                self.document_received(doc);
                Vec::new()
            }
            ServerMessage::SendChangesAck(ack) => self.ack(ack),
            ServerMessage::Pong(_) => Vec::new(),
            ServerMessage::Error(err) => {
                warn!("Server reported an error: {}", err.message);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(effects: &[Effect]) -> Vec<ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    fn submitted_seq(effects: &[Effect]) -> u64 {
        match sent(effects).as_slice() {
            [ClientMessage::SendChanges(msg)] => msg.request_id,
            other => panic!("expected exactly one submission, got {other:?}"),
        }
    }

    fn ok(seq: u64, version: u64) -> AckMessage {
        AckMessage {
            request_id: seq,
            success: true,
            message: None,
            version: Some(version),
        }
    }

    fn failed(seq: u64) -> AckMessage {
        AckMessage {
            request_id: seq,
            success: false,
            message: Some("Failed to save document".into()),
            version: None,
        }
    }

    fn doc(id: &str, content: &str, version: u64) -> DocumentMessage {
        DocumentMessage {
            id: id.into(),
            content: content.into(),
            version,
        }
    }

    fn online() -> SyncMachine {
        let mut m = SyncMachine::new("x", None);
        m.connected();
        m
    }

    #[test]
    fn edit_debounce_ack_reaches_saved() {
        let mut m = online();

        let effects = m.local_edit("hello".into());
        assert_eq!(
            effects,
            vec![Effect::PersistUnsaved("hello".into()), Effect::ArmDebounce]
        );
        assert_eq!(m.status(), SyncStatus::Waiting);

        let effects = m.debounce_elapsed();
        let seq = submitted_seq(&effects);
        assert!(effects.contains(&Effect::ArmSubmitTimeout(seq)));
        assert_eq!(m.status(), SyncStatus::Saving);

        let effects = m.ack(&ok(seq, 1));
        assert_eq!(effects, vec![Effect::CancelSubmitTimeout, Effect::ClearUnsaved]);
        assert_eq!(m.status(), SyncStatus::Saved);
        assert_eq!(m.unsaved(), None);
        assert_eq!(m.view().version, Some(1));
    }

    #[test]
    fn failed_ack_keeps_unsaved_cache() {
        let mut m = online();
        m.local_edit("foo".into());
        let seq = submitted_seq(&m.debounce_elapsed());

        let effects = m.ack(&failed(seq));
        assert!(!effects.contains(&Effect::ClearUnsaved));
        assert_eq!(m.status(), SyncStatus::Error);
        assert_eq!(m.unsaved(), Some("foo"));
    }

    #[test]
    fn timeout_keeps_unsaved_cache_and_late_ack_is_honored() {
        let mut m = SyncMachine::new("x", None);
        m.local_edit("foo".into());
        let seq = submitted_seq(&m.debounce_elapsed());

        assert!(m.submit_timeout(seq).is_empty());
        assert_eq!(m.status(), SyncStatus::Error);
        assert_eq!(m.unsaved(), Some("foo"));

        // Timer for an older seq is a no-op.
        assert!(m.submit_timeout(seq).is_empty());

        // The write did land after all.
        let effects = m.ack(&ok(seq, 1));
        assert_eq!(effects, vec![Effect::ClearUnsaved]);
        assert_eq!(m.status(), SyncStatus::Saved);
    }

    #[test]
    fn stale_ack_does_not_mask_newer_edit() {
        let mut m = online();
        m.local_edit("a".into());
        let seq = submitted_seq(&m.debounce_elapsed());

        // Typing continues while "a" is in flight.
        m.local_edit("ab".into());
        let effects = m.ack(&ok(seq, 1));

        assert!(!effects.contains(&Effect::ClearUnsaved));
        assert_eq!(m.status(), SyncStatus::Waiting);
        assert_eq!(m.unsaved(), Some("ab"));
        assert_eq!(m.content(), "ab");
    }

    #[test]
    fn one_submission_in_flight_at_a_time() {
        let mut m = online();
        m.local_edit("a".into());
        let first = submitted_seq(&m.debounce_elapsed());

        m.local_edit("ab".into());
        assert!(sent(&m.debounce_elapsed()).is_empty());
        assert_eq!(m.in_flight().map(|s| s.seq), Some(first));

        // Resolving the first sends the newest content straight away.
        let effects = m.ack(&ok(first, 1));
        assert!(!effects.contains(&Effect::ClearUnsaved));
        match sent(&effects).as_slice() {
            [ClientMessage::SendChanges(msg)] => {
                assert_eq!(msg.content, "ab");
                assert_eq!(msg.request_id, first + 1);
                assert_eq!(msg.base_version, Some(1));
            }
            other => panic!("expected resubmission, got {other:?}"),
        }

        // A late duplicate ack for the first one changes nothing.
        assert!(m.ack(&ok(first, 1)).is_empty());
        assert_eq!(m.status(), SyncStatus::Saving);

        m.ack(&ok(first + 1, 2));
        assert_eq!(m.status(), SyncStatus::Saved);
        assert_eq!(m.unsaved(), None);
    }

    #[test]
    fn reconnect_with_unsaved_resubmits() {
        let mut m = SyncMachine::new("x", None);
        m.local_edit("foo".into());
        let seq = submitted_seq(&m.debounce_elapsed());
        m.submit_timeout(seq);
        m.disconnected();

        let effects = m.connected();
        match sent(&effects).as_slice() {
            [ClientMessage::SendChanges(msg)] => {
                assert_eq!(msg.content, "foo");
                assert!(msg.request_id > seq);
            }
            other => panic!("expected resubmission, got {other:?}"),
        }
        assert_eq!(m.status(), SyncStatus::Saving);
        assert!(m.is_online());
    }

    #[test]
    fn reconnect_without_unsaved_requests_document() {
        let mut m = SyncMachine::new("x", None);
        let effects = m.connected();
        assert_eq!(
            sent(&effects),
            vec![ClientMessage::RequestDocument(RequestDocumentMessage { id: "x".into() })]
        );
    }

    #[test]
    fn reconnect_drops_in_flight_from_old_link() {
        let mut m = online();
        m.local_edit("a".into());
        let old = submitted_seq(&m.debounce_elapsed());
        m.disconnected();

        let effects = m.connected();
        assert!(effects.contains(&Effect::CancelSubmitTimeout));
        let new = submitted_seq(&effects);

        // The old link's ack, should it still arrive, is ignored.
        assert!(m.ack(&ok(old, 1)).is_empty());
        assert_eq!(m.status(), SyncStatus::Saving);
        m.ack(&ok(new, 1));
        assert_eq!(m.status(), SyncStatus::Saved);
    }

    #[test]
    fn pushes_apply_only_without_unsaved_work() {
        let mut m = online();
        assert!(m.document_received(&doc("x", "from server", 3)));
        assert_eq!(m.content(), "from server");
        assert_eq!(m.status(), SyncStatus::Saved);

        m.local_edit("mine".into());
        assert!(!m.document_received(&doc("x", "theirs", 4)));
        assert_eq!(m.content(), "mine");

        // Pushes for a different document are not ours.
        let mut m = online();
        assert!(!m.document_received(&doc("other", "nope", 1)));
        assert_eq!(m.content(), "");
    }

    #[test]
    fn restored_cache_is_resubmitted_on_first_connect() {
        let mut m = SyncMachine::new("x", Some("draft".into()));
        assert_eq!(m.content(), "draft");
        assert_eq!(m.status(), SyncStatus::Waiting);

        match sent(&m.connected()).as_slice() {
            [ClientMessage::SendChanges(msg)] => assert_eq!(msg.content, "draft"),
            other => panic!("expected resubmission, got {other:?}"),
        }
    }

    #[test]
    fn flush_skips_the_debounce_window() {
        let mut m = online();
        m.local_edit("bye".into());
        let effects = m.flush();
        assert_eq!(effects[0], Effect::CancelDebounce);
        submitted_seq(&effects);

        // Already in flight: a second flush waits for the first to resolve.
        assert!(m.flush().is_empty());
        assert!(m.in_flight().is_some());

        let mut idle = online();
        assert!(idle.flush().is_empty());
    }

    #[test]
    fn cache_survives_any_failure_sequence() {
        let mut m = SyncMachine::new("x", None);
        let mut cleared = false;
        let mut apply = |effects: Vec<Effect>| {
            if effects.contains(&Effect::ClearUnsaved) {
                cleared = true;
            }
            effects
        };

        apply(m.local_edit("v1".into()));
        let s1 = submitted_seq(&apply(m.debounce_elapsed()));
        apply(m.ack(&failed(s1)));
        apply(m.local_edit("v2".into()));
        let s2 = submitted_seq(&apply(m.debounce_elapsed()));
        apply(m.submit_timeout(s2));
        apply(m.disconnected());
        let s3 = submitted_seq(&apply(m.connected()));
        apply(m.ack(&failed(s3)));

        assert!(!cleared);
        assert_eq!(m.unsaved(), Some("v2"));
        assert_eq!(m.status(), SyncStatus::Error);
    }

    #[test]
    fn pushes_match_any_spelling_of_the_document_id() {
        let mut m = SyncMachine::new("./notes//a.md", None);
        assert!(m.document_received(&doc("notes/a.md", "from server", 2)));
        assert_eq!(m.content(), "from server");
    }
}
