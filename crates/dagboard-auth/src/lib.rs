//! # dagboard-auth
//!
//! Durable client-side session state: the bearer token, the username, the
//! cached user profile and the path to return to after logging in.
//!
//! State lives in a JSON file (`~/.dagboard/state.json` by default) written
//! with owner-only permissions. [`ClientStorage`] keeps an in-memory copy and
//! writes through on every change.

#![deny(unsafe_code)]

pub mod errors;
pub mod storage;
pub mod types;

pub use errors::AuthError;
pub use storage::{ClientStorage, load_client_state, save_client_state};
pub use types::ClientState;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _state = ClientState::new();
        let _storage = ClientStorage::in_memory();
    }
}
