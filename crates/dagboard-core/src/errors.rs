//! Error types shared by the client crates.

use thiserror::Error;

/// Error returned by a channel event handler.
///
/// Handler failures are logged by the dispatcher and never stop delivery to
/// the remaining handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not have the shape the handler expects.
    #[error("unexpected payload: {0}")]
    Payload(String),

    /// The payload referenced an id that could not be canonicalized.
    #[error(transparent)]
    Id(#[from] IdError),

    /// Payload deserialization failed.
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other handler failure.
    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    /// Shorthand for a payload-shape error.
    #[must_use]
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload(message.into())
    }
}

/// An entity id could not be derived from a JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The record has no `id` field.
    #[error("record has no id")]
    Missing,

    /// The id is neither a string nor a number.
    #[error("unsupported id value: {0}")]
    Unsupported(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
