//! Refresh stores after a channel reconnect.
//!
//! Events sent while the channel was down are never replayed. A store
//! registered with [`spawn_resync`] re-runs its bulk fetch every time the
//! channel opens again after its first open.

use std::sync::Arc;

use async_trait::async_trait;
use dagboard_channel::ChannelClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;

/// A store that can re-run its bulk fetch.
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    /// Store name used in logs.
    fn name(&self) -> &'static str;

    /// Re-fetch server state. Must not register handlers again.
    async fn refresh(&self) -> Result<()>;
}

/// Refresh `store` on every channel re-open.
///
/// The task ends once the channel is shut down. Spawn it again after a
/// later `connect()` to keep resyncing.
pub fn spawn_resync<S: Refresh + ?Sized>(channel: &ChannelClient, store: Arc<S>) -> JoinHandle<()> {
    let mut opens = channel.subscribe_opens();
    let mut shut_down = channel.subscribe_shutdown();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = opens.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = *opens.borrow_and_update();
                    if count <= 1 {
                        continue;
                    }
                    info!(store = store.name(), opens = count, "channel reopened; refreshing");
                    if let Err(e) = store.refresh().await {
                        warn!(store = store.name(), error = %e, "resync failed");
                    }
                }
                () = wait_shut_down(&mut shut_down) => {
                    debug!(store = store.name(), "channel shut down; resync stopped");
                    break;
                }
            }
        }
    })
}

async fn wait_shut_down(shut_down: &mut watch::Receiver<bool>) {
    let _ = shut_down.wait_for(|s| *s).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
