//! Shared fixtures for store tests.

use std::sync::Arc;
use std::time::Duration;

use dagboard_api::ApiClient;
use dagboard_auth::ClientStorage;
use dagboard_channel::{ChannelClient, WsConnector};
use dagboard_core::{MessageCenter, ReconnectPolicy};
use url::Url;
use wiremock::MockServer;

/// API client pointed at `server`, with an in-memory session.
pub(crate) fn api(server: &MockServer) -> Arc<ApiClient> {
    Arc::new(
        ApiClient::new(
            Url::parse(&server.uri()).unwrap(),
            Duration::from_secs(5),
            Arc::new(ClientStorage::in_memory()),
            Arc::new(MessageCenter::default()),
        )
        .unwrap(),
    )
}

/// Channel that is never connected; tests feed it with `dispatch_frame`.
pub(crate) fn channel() -> ChannelClient {
    ChannelClient::new(
        Url::parse("ws://127.0.0.1:1/ws").unwrap(),
        ReconnectPolicy::default(),
        Arc::new(WsConnector),
    )
}

/// Texts of the messages reported so far.
pub(crate) fn message_texts(api: &ApiClient) -> Vec<String> {
    api.messages().messages().into_iter().map(|m| m.text).collect()
}
