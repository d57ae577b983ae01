//! # dagboard-core
//!
//! Shared vocabulary for the dagboard client crates:
//!
//! - **Entity ids**: [`EntityId`] canonicalizes numeric and string ids to one key
//! - **Channel events**: [`ChannelEvent`] frames and typed [`EventKey`] dispatch keys
//! - **Backoff**: [`ReconnectPolicy`] with the linear reconnect schedule
//! - **Errors**: handler and id errors via `thiserror`
//! - **Messages**: [`MessageCenter`], the user-visible notification sink
//! - **Logging**: `tracing` subscriber setup and a capture layer for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;

pub use errors::{HandlerError, IdError};
pub use events::{ChannelEvent, EventAction, EventGroup, EventKey};
pub use ids::{EntityId, MessageId};
pub use messages::{MessageCenter, MessageKind, UserMessage};
pub use retry::ReconnectPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
