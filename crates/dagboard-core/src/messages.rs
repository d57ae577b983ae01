//! User-visible messages.
//!
//! [`MessageCenter`] is the single sink every crate reports user-facing
//! failures and confirmations to. Messages expire after a fixed TTL and are
//! pruned lazily on read; live subscribers get every message as it is added.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::constants::MESSAGE_TTL_MS;
use crate::ids::MessageId;

/// Severity of a user message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Operation succeeded.
    Success,
    /// Informational notice.
    Info,
    /// Something needs attention.
    Warning,
    /// Operation failed.
    Error,
    /// Server-provided code (e.g. the `code` of a template answer).
    Other(String),
}

impl MessageKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "info" => Self::Info,
            "warning" => Self::Warning,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(k: MessageKind) -> Self {
        k.as_str().to_owned()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-visible message.
#[derive(Clone, Debug)]
pub struct UserMessage {
    /// Unique id, usable with [`MessageCenter::remove`].
    pub id: MessageId,
    /// Severity.
    pub kind: MessageKind,
    /// Text shown to the user.
    pub text: String,
    /// When the message was added.
    pub created_at: Instant,
}

/// Notification sink shared by the API client and the stores.
pub struct MessageCenter {
    ttl: Duration,
    messages: Mutex<Vec<UserMessage>>,
    tx: broadcast::Sender<UserMessage>,
}

impl MessageCenter {
    /// Create a sink whose messages live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            ttl,
            messages: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Add a message and notify subscribers.
    pub fn add(&self, kind: MessageKind, text: impl Into<String>) -> MessageId {
        let message = UserMessage {
            id: MessageId::new(),
            kind,
            text: text.into(),
            created_at: Instant::now(),
        };
        tracing::debug!(kind = %message.kind, text = %message.text, "user message");
        let id = message.id.clone();
        let _ = self.tx.send(message.clone());
        self.messages.lock().push(message);
        id
    }

    /// Add an error message.
    pub fn error(&self, text: impl Into<String>) -> MessageId {
        self.add(MessageKind::Error, text)
    }

    /// Add an info message.
    pub fn info(&self, text: impl Into<String>) -> MessageId {
        self.add(MessageKind::Info, text)
    }

    /// Add a success message.
    pub fn success(&self, text: impl Into<String>) -> MessageId {
        self.add(MessageKind::Success, text)
    }

    /// Remove a message before it expires.
    pub fn remove(&self, id: &MessageId) {
        self.messages.lock().retain(|m| &m.id != id);
    }

    /// Messages that have not expired yet, oldest first.
    pub fn messages(&self) -> Vec<UserMessage> {
        let mut messages = self.messages.lock();
        let ttl = self.ttl;
        messages.retain(|m| m.created_at.elapsed() < ttl);
        messages.clone()
    }

    /// Subscribe to messages added from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UserMessage> {
        self.tx.subscribe()
    }
}

impl Default for MessageCenter {
    fn default() -> Self {
        Self::new(Duration::from_millis(MESSAGE_TTL_MS))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_list() {
        let center = MessageCenter::default();
        let _ = center.error("Network error");
        let _ = center.success("Dags saved.");
        let texts: Vec<_> = center.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["Network error", "Dags saved."]);
    }

    #[test]
    fn remove_by_id() {
        let center = MessageCenter::default();
        let id = center.info("hello");
        let _ = center.info("world");
        center.remove(&id);
        let messages = center.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "world");
    }

    #[tokio::test(start_paused = true)]
    async fn messages_expire_after_ttl() {
        let center = MessageCenter::new(Duration::from_millis(5000));
        let _ = center.error("gone soon");
        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(center.messages().len(), 1);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(center.messages().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_messages() {
        let center = MessageCenter::default();
        let mut rx = center.subscribe();
        let _ = center.add(MessageKind::Warning, "careful");
        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind, MessageKind::Warning);
        assert_eq!(message.text, "careful");
    }

    #[test]
    fn server_codes_map_to_kinds() {
        assert_eq!(MessageKind::from("error"), MessageKind::Error);
        assert_eq!(MessageKind::from("exists"), MessageKind::Other("exists".into()));
        assert_eq!(MessageKind::Other("exists".into()).to_string(), "exists");
    }
}
