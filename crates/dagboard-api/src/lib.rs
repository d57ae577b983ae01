//! # dagboard-api
//!
//! HTTP client for the dagboard server API.
//!
//! - [`ApiClient`]: request builder with bearer auth and the error contract
//! - [`Payload`]: explicit JSON / URL-encoded form / multipart bodies
//! - [`problem`]: turns error responses into user-visible messages
//! - [`session`]: login, logout and profile loading
//! - [`status`]: host status endpoints
//!
//! Every failed request reports its messages to the shared
//! [`MessageCenter`](dagboard_core::MessageCenter) before returning an
//! [`ApiError`]. A 401 on an authenticated request forces a logout.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod payload;
pub mod problem;
pub mod session;
pub mod status;

pub use client::{ApiClient, SessionEvent};
pub use errors::{ApiError, Result};
pub use payload::{FilePart, Payload, RequestOptions};
pub use reqwest::Method;
pub use session::LoginOutcome;
