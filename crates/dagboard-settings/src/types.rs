//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted; missing fields keep their default value.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use dagboard_core::ReconnectPolicy;
use dagboard_core::constants::{LOG_HISTORY_LIMIT, MESSAGE_TTL_MS, WS_PATH};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "origin": "https://hub.local" },
///   "channel": { "maxRetries": 5, "baseDelayMs": 3000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DagboardSettings {
    /// Server location and HTTP behavior.
    pub server: ServerSettings,
    /// Real-time channel reconnect policy.
    pub channel: ReconnectPolicy,
    /// Mirrored store limits.
    pub store: StoreSettings,
    /// User message behavior.
    pub messages: MessageSettings,
    /// Persisted client state location.
    pub storage: StorageSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Server location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Origin of the dashboard server (`http://host:port` or `https://…`).
    pub origin: String,
    /// Path of the real-time endpoint.
    pub ws_path: String,
    /// Timeout applied to every HTTP request in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
            ws_path: WS_PATH.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ServerSettings {
    /// Parsed server origin.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SettingsError::InvalidValue(format!(
                "origin scheme must be http or https, got {other}"
            ))),
        }
    }

    /// Real-time endpoint derived from the origin.
    ///
    /// A secure origin (`https`) yields `wss`, anything else `ws`.
    pub fn ws_url(&self) -> Result<Url> {
        let mut url = self.origin_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| SettingsError::InvalidValue(format!("cannot use scheme {scheme}")))?;
        url.set_path(&self.ws_path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Mirrored store limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Maximum entries kept per dag in the log history.
    pub log_history_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            log_history_limit: LOG_HISTORY_LIMIT,
        }
    }
}

/// User message behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageSettings {
    /// How long a message stays visible in milliseconds.
    pub ttl_ms: u64,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            ttl_ms: MESSAGE_TTL_MS,
        }
    }
}

impl MessageSettings {
    /// Message lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Persisted client state location.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Explicit state file; `~/.dagboard/state.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
}

impl StorageSettings {
    /// Resolved state file path.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .as_ref()
            .map_or_else(|| crate::loader::data_dir().join("state.json"), PathBuf::from)
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
