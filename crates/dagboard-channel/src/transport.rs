//! Transport seam.
//!
//! A [`Connector`] opens the channel and yields inbound text frames. The
//! stream ending means the peer closed; an `Err` item means the transport
//! failed. Dropping the stream closes the transport.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::errors::{ChannelError, Result};

/// Inbound text frames of one open transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens transports to the channel endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    async fn connect(&self, url: &Url) -> Result<FrameStream>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream> {
        let (ws, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| ChannelError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        debug!(url = %url, "websocket open");

        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket close frame");
                    None
                }
                Ok(other) => {
                    trace!(kind = message_kind(&other), "ignoring non-text frame");
                    None
                }
                Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
            }
        });
        Ok(Box::pin(frames))
    }
}

fn message_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let url = Url::parse("ws://127.0.0.1:1/ws").unwrap();
        let Err(err) = WsConnector.connect(&url).await else {
            panic!("expected connection failure");
        };
        assert_matches!(err, ChannelError::Connect { ref url, .. } if url == "ws://127.0.0.1:1/ws");
    }

    #[test]
    fn message_kinds() {
        assert_eq!(message_kind(&Message::Ping(Vec::new().into())), "ping");
        assert_eq!(message_kind(&Message::Binary(Vec::new().into())), "binary");
    }
}
