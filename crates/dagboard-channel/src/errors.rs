//! Channel error types.

use thiserror::Error;

/// Errors raised by the channel transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport could not be opened.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The open transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The channel URL could not be derived from settings.
    #[error(transparent)]
    Settings(#[from] dagboard_settings::SettingsError),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_url() {
        let err = ChannelError::Connect {
            url: "ws://127.0.0.1:8000/ws".into(),
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to connect to ws://127.0.0.1:8000/ws: connection refused"
        );
    }
}
