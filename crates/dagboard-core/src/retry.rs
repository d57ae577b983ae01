//! Reconnect policy and backoff calculation.
//!
//! The channel client reconnects with a **linear** schedule: the Nth retry
//! waits `N * base_delay`. After `max_retries` consecutive failed
//! connections no further retry is scheduled.
//!
//! - [`ReconnectPolicy`]: retry ceiling and delay increment
//! - [`linear_backoff_delay`]: delay for a given retry number

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_RETRIES, RETRY_BASE_DELAY_MS};

/// Reconnect parameters for the real-time channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Maximum number of automatic reconnects (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay increment per retry in ms (default: 3000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    RETRY_BASE_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: RETRY_BASE_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Decide whether another retry is allowed after `retries_so_far`
    /// consecutive failures.
    ///
    /// Returns the 1-based number of the next retry and how long to wait
    /// before it, or `None` once the ceiling is reached.
    #[must_use]
    pub fn next_retry(&self, retries_so_far: u32) -> Option<(u32, Duration)> {
        if retries_so_far >= self.max_retries {
            return None;
        }
        let retry = retries_so_far + 1;
        Some((retry, linear_backoff_delay(retry, self.base_delay_ms)))
    }
}

/// Delay before retry number `retry` (1-based): `retry * base_delay_ms`.
#[must_use]
pub fn linear_backoff_delay(retry: u32, base_delay_ms: u64) -> Duration {
    Duration::from_millis(base_delay_ms.saturating_mul(u64::from(retry)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
