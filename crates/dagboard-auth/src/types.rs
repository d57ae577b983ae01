//! Persisted client state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

/// Everything the client remembers between runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    /// Format version.
    pub version: u32,
    /// Bearer token for the HTTP API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Logged-in username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Cached `/api/me/` profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,
    /// Path to return to after the next successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// RFC 3339 timestamp of the last write.
    #[serde(default)]
    pub last_updated: String,
}

impl ClientState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            token: None,
            user: None,
            user_data: None,
            redirect: None,
            last_updated: String::new(),
        }
    }

    /// Drop the session (token, user, profile); the redirect survives.
    pub fn clear_session(&mut self) {
        self.token = None;
        self.user = None;
        self.user_data = None;
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_state_serializes_compactly() {
        let value = serde_json::to_value(ClientState::new()).unwrap();
        assert_eq!(value, json!({"version": 1, "lastUpdated": ""}));
    }

    #[test]
    fn clear_session_keeps_redirect() {
        let mut state = ClientState {
            token: Some("t".into()),
            user: Some("admin".into()),
            user_data: Some(json!({"role": "admin"})),
            redirect: Some("/dags".into()),
            ..ClientState::new()
        };
        state.clear_session();
        assert!(state.token.is_none());
        assert!(state.user_data.is_none());
        assert_eq!(state.redirect.as_deref(), Some("/dags"));
    }
}
