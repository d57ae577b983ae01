//! External connections: what can be configured and what is live.

use std::sync::Arc;

use dagboard_api::ApiClient;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::errors::Result;

const AVAILABLE_PATH: &str = "/api/connections_list";
const LIVE_PATH: &str = "/api/live/connections";

/// Available and live connection lists.
pub struct ConnectionsStore {
    api: Arc<ApiClient>,
    available: RwLock<Vec<Value>>,
    live: RwLock<Vec<Value>>,
}

impl ConnectionsStore {
    /// Empty store.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            available: RwLock::new(Vec::new()),
            live: RwLock::new(Vec::new()),
        }
    }

    /// Reload the connection types the server supports.
    pub async fn fetch_available(&self) -> Result<Vec<Value>> {
        let available = self.fetch(AVAILABLE_PATH).await?;
        self.available.write().clone_from(&available);
        Ok(available)
    }

    /// Reload the state of open connections.
    pub async fn fetch_live(&self) -> Result<Vec<Value>> {
        let live = self.fetch(LIVE_PATH).await?;
        self.live.write().clone_from(&live);
        Ok(live)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Value>> {
        Ok(self.api.get_json(path).await.inspect_err(|e| {
            warn!(path, error = %e, "connections fetch failed");
        })?)
    }

    /// Last fetched available connections.
    pub fn available(&self) -> Vec<Value> {
        self.available.read().clone()
    }

    /// Last fetched live connections.
    pub fn live(&self) -> Vec<Value> {
        self.live.read().clone()
    }
}
