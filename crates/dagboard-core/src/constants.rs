//! Package-level constants.

/// Current client version (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "dagboard";

/// Path of the real-time endpoint relative to the server origin.
pub const WS_PATH: &str = "/ws";

/// Maximum number of automatic reconnect attempts.
pub const MAX_RETRIES: u32 = 5;

/// Linear reconnect delay increment in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 3000;

/// Per-parent cap for append-only log histories.
pub const LOG_HISTORY_LIMIT: usize = 1000;

/// Lifetime of a user-visible message in milliseconds.
pub const MESSAGE_TTL_MS: u64 = 5000;
