//! One-shot initialization guard.
//!
//! A store initializes at most once. Callers that arrive while a load is in
//! flight wait for it instead of issuing their own fetch, and share its
//! outcome. A failed load leaves the guard uninitialized so a later call
//! retries.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

/// Lifecycle of a mirrored collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionState {
    /// Nothing loaded yet, or the last load failed.
    #[default]
    Uninitialized,
    /// The bulk fetch is in flight.
    Loading,
    /// Loaded and subscribed. Terminal.
    Ready,
}

/// The load this caller waited for failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("initialization failed: {0}")]
pub struct InitFailed(pub String);

/// Single-flight initialization.
#[derive(Debug, Default)]
pub struct InitGuard {
    ready: AtomicBool,
    attempt: tokio::sync::Mutex<()>,
    failures: AtomicU64,
    last_failure: Mutex<Option<String>>,
    state: RwLock<CollectionState>,
}

impl InitGuard {
    /// Fresh, uninitialized guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> CollectionState {
        *self.state.read()
    }

    /// Whether initialization completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Run `load` unless initialization already succeeded.
    ///
    /// Concurrent callers share one in-flight run. When that run fails the
    /// caller that ran it gets the original error and every caller that was
    /// waiting gets [`InitFailed`] with its text. The state goes back to
    /// [`CollectionState::Uninitialized`] so a later call retries.
    pub async fn run<F, Fut, E>(&self, load: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display + From<InitFailed>,
    {
        if self.is_ready() {
            return Ok(());
        }
        let failures_seen = self.failures.load(Ordering::Acquire);
        let _attempt = self.attempt.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        if self.failures.load(Ordering::Acquire) != failures_seen {
            let text = self.last_failure.lock().clone().unwrap_or_default();
            debug!(error = %text, "shared initial load failed");
            return Err(InitFailed(text).into());
        }

        *self.state.write() = CollectionState::Loading;
        debug!("initial load started");
        match load().await {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                *self.state.write() = CollectionState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.last_failure.lock() = Some(e.to_string());
                let _ = self.failures.fetch_add(1, Ordering::AcqRel);
                *self.state.write() = CollectionState::Uninitialized;
                Err(e)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
