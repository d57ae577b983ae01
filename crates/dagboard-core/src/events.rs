//! Real-time channel frames and their typed dispatch keys.
//!
//! Every inbound frame is a JSON object `{type, action, data}`. The pair
//! `(type, action)` selects the handlers; `data` is passed through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity group named by the `type` field of a frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventGroup {
    /// Dag nodes of the running graph.
    Dag,
    /// Dag templates.
    Template,
    /// Live port values.
    Port,
    /// Dag log lines.
    Log,
    /// A group this client has no variant for.
    Other(String),
}

impl EventGroup {
    /// Wire name of the group.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Dag => "dag",
            Self::Template => "template",
            Self::Port => "port",
            Self::Log => "log",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EventGroup {
    fn from(s: &str) -> Self {
        match s {
            "dag" => Self::Dag,
            "template" => Self::Template,
            "port" => Self::Port,
            "log" => Self::Log,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for EventGroup {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventGroup> for String {
    fn from(g: EventGroup) -> Self {
        g.as_str().to_owned()
    }
}

/// Operation named by the `action` field of a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventAction {
    /// A record was created.
    Add,
    /// A record was replaced.
    Update,
    /// Only the `params` of a record changed.
    UpdateParams,
    /// A record was deleted.
    Remove,
    /// A value arrived on an input port.
    In,
    /// Empty action, used by log frames.
    #[default]
    Unspecified,
    /// An action this client has no variant for.
    Other(String),
}

impl EventAction {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::UpdateParams => "update_params",
            Self::Remove => "remove",
            Self::In => "in",
            Self::Unspecified => "",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EventAction {
    fn from(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "update" => Self::Update,
            "update_params" => Self::UpdateParams,
            "remove" => Self::Remove,
            "in" => Self::In,
            "" => Self::Unspecified,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for EventAction {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventAction> for String {
    fn from(a: EventAction) -> Self {
        a.as_str().to_owned()
    }
}

/// Dispatch key: the `(group, action)` pair of a frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Entity group.
    pub group: EventGroup,
    /// Operation.
    pub action: EventAction,
}

impl EventKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(group: EventGroup, action: EventAction) -> Self {
        Self { group, action }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group.as_str(), self.action.as_str())
    }
}

/// One inbound frame of the real-time channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Entity group (`type` on the wire).
    #[serde(rename = "type")]
    pub group: EventGroup,
    /// Operation.
    #[serde(default)]
    pub action: EventAction,
    /// Opaque payload forwarded to handlers.
    #[serde(default)]
    pub data: Value,
}

impl ChannelEvent {
    /// Parse a text frame.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Dispatch key of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey::new(self.group.clone(), self.action.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
