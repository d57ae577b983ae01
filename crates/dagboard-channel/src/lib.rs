//! # dagboard-channel
//!
//! Reconnecting WebSocket client for the dagboard real-time channel.
//!
//! - [`ChannelClient`]: cloneable handle owning the connection task, the
//!   listener map and the reconnect schedule
//! - [`Listeners`]: ordered handler lists keyed by [`EventKey`](dagboard_core::EventKey)
//! - [`Connector`]: transport seam; [`WsConnector`] speaks WebSocket via
//!   `tokio-tungstenite`
//!
//! Inbound frames are JSON `{type, action, data}`. Every handler registered
//! for the frame's key runs, in registration order, before the next frame
//! is read. Handler failures and panics are logged and never stop delivery.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod listeners;
pub mod state;
pub mod transport;

pub use client::ChannelClient;
pub use errors::{ChannelError, Result};
pub use listeners::{Handler, Listeners};
pub use state::ConnectionState;
pub use transport::{Connector, FrameStream, WsConnector};
