//! # dagboard-settings
//!
//! Configuration for the dagboard client, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`DagboardSettings::default()`]
//! 2. **User file**: `~/.dagboard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DAGBOARD_*` overrides (highest priority)
//!
//! Settings are loaded explicitly and passed to the components that need
//! them; there is no process-wide instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{data_dir, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
