//! Store error types.

use dagboard_api::ApiError;
use thiserror::Error;

use crate::init::InitFailed;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying HTTP call failed; messages were already reported.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A concurrent initialization this call waited for failed.
    #[error(transparent)]
    Init(#[from] InitFailed),

    /// The operation needs a template page to be selected.
    #[error("current page is not a template page")]
    NotTemplatePage,

    /// No draft is open for the template.
    #[error("no draft open for template {0}")]
    UnknownDraft(String),

    /// The template draft has no node with this id.
    #[error("template node not found: {0}")]
    UnknownNode(String),

    /// A server payload had an unexpected shape.
    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
