//! API error types.

use thiserror::Error;

/// Errors returned by [`ApiClient`](crate::ApiClient) calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response (refused, reset, timeout).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {}", messages.join("; "))]
    Status {
        /// HTTP status code.
        status: u16,
        /// User-visible messages extracted from the body.
        messages: Vec<String>,
    },

    /// The session is no longer valid; the client has been logged out.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Message reported to the user.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The server accepted the request but reported an application error.
    #[error("server rejected request ({code}): {message}")]
    Rejected {
        /// Application-level code (anything but `ok`).
        code: String,
        /// Server message.
        message: String,
    },

    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Request construction failed (e.g. an invalid multipart MIME type).
    #[error("invalid request: {0}")]
    Build(String),

    /// Persisting client state failed.
    #[error(transparent)]
    Storage(#[from] dagboard_auth::AuthError),

    /// Settings could not be interpreted.
    #[error(transparent)]
    Settings(#[from] dagboard_settings::SettingsError),
}

impl ApiError {
    /// HTTP status of the failure, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
