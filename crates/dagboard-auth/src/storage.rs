//! Client state file I/O.
//!
//! Reads and writes the state file with secure file permissions (0o600).

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::AuthError;
use crate::types::{ClientState, STATE_VERSION};

/// Load client state from file.
///
/// Returns `None` if the file doesn't exist or is invalid.
pub fn load_client_state(path: &Path) -> Option<ClientState> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read state file: {e}");
            return None;
        }
    };

    match serde_json::from_str::<ClientState>(&data) {
        Ok(state) if state.version == STATE_VERSION => Some(state),
        Ok(state) => {
            tracing::warn!("unsupported state file version: {}", state.version);
            None
        }
        Err(e) => {
            tracing::warn!("failed to parse state file: {e}");
            None
        }
    }
}

/// Save client state to file.
///
/// Creates parent directories if needed. Sets file permissions to 0o600.
pub fn save_client_state(path: &Path, state: &mut ClientState) -> Result<(), AuthError> {
    state.last_updated = chrono::Utc::now().to_rfc3339();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

/// Write-through cache of the client state.
///
/// Readers never touch the disk. Every mutation updates memory first and then
/// persists the whole state; an in-memory storage (no path) skips the write.
pub struct ClientStorage {
    path: Option<PathBuf>,
    state: RwLock<ClientState>,
}

impl ClientStorage {
    /// Open the state file at `path`, starting empty if it is missing or
    /// unreadable.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_client_state(&path).unwrap_or_default();
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    /// Storage that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(ClientState::new()),
        }
    }

    /// Snapshot of the whole state.
    pub fn snapshot(&self) -> ClientState {
        self.state.read().clone()
    }

    /// Bearer token, if logged in.
    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    /// Logged-in username.
    pub fn user(&self) -> Option<String> {
        self.state.read().user.clone()
    }

    /// Cached user profile.
    pub fn user_data(&self) -> Option<Value> {
        self.state.read().user_data.clone()
    }

    /// Stored post-login redirect.
    pub fn redirect(&self) -> Option<String> {
        self.state.read().redirect.clone()
    }

    /// Persist a fresh login.
    pub fn set_credentials(&self, user: &str, token: &str) -> Result<(), AuthError> {
        self.update(|s| {
            s.user = Some(user.to_string());
            s.token = Some(token.to_string());
        })
    }

    /// Persist the user profile.
    pub fn set_user_data(&self, data: Value) -> Result<(), AuthError> {
        self.update(|s| s.user_data = Some(data))
    }

    /// Remember where to go after the next login.
    pub fn set_redirect(&self, path: &str) -> Result<(), AuthError> {
        self.update(|s| s.redirect = Some(path.to_string()))
    }

    /// Remove and return the stored redirect.
    pub fn take_redirect(&self) -> Result<Option<String>, AuthError> {
        let mut taken = None;
        self.update(|s| taken = s.redirect.take())?;
        Ok(taken)
    }

    /// Forget token, user and profile.
    pub fn clear_session(&self) -> Result<(), AuthError> {
        self.update(ClientState::clear_session)
    }

    fn update(&self, f: impl FnOnce(&mut ClientState)) -> Result<(), AuthError> {
        let mut state = self.state.write();
        f(&mut state);
        match &self.path {
            Some(path) => save_client_state(path, &mut state),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
