//! Listener registry.
//!
//! Each [`EventKey`] maps to an ordered list of [`Handler`]s. The same
//! handler may be registered more than once and then runs once per
//! registration. Removal takes out the first entry with the same identity.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dagboard_core::{EventKey, HandlerError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, trace, warn};

type HandlerFn = dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync;

/// A registered callback. Clones share identity.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Whether `self` and `other` are the same registration handle.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Run the callback.
    pub fn call(&self, data: &Value) -> Result<(), HandlerError> {
        (self.0)(data)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Key → ordered handler lists.
#[derive(Default)]
pub struct Listeners {
    map: Mutex<HashMap<EventKey, Vec<Handler>>>,
}

impl Listeners {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` under `key`.
    pub fn add(&self, key: EventKey, handler: Handler) {
        self.map.lock().entry(key).or_default().push(handler);
    }

    /// Remove the first registration of `handler` under `key`.
    ///
    /// Returns whether an entry was removed. The key disappears with its
    /// last handler.
    pub fn remove(&self, key: &EventKey, handler: &Handler) -> bool {
        let mut map = self.map.lock();
        let Some(list) = map.get_mut(key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|h| h.same(handler)) else {
            return false;
        };
        let _ = list.remove(pos);
        if list.is_empty() {
            let _ = map.remove(key);
        }
        true
    }

    /// Copy of the handler list for `key`.
    pub fn snapshot(&self, key: &EventKey) -> Vec<Handler> {
        self.map.lock().get(key).cloned().unwrap_or_default()
    }

    /// Number of registrations under `key`.
    pub fn count(&self, key: &EventKey) -> usize {
        self.map.lock().get(key).map_or(0, Vec::len)
    }

    /// Whether `key` has any registration.
    pub fn contains_key(&self, key: &EventKey) -> bool {
        self.map.lock().contains_key(key)
    }

    /// Number of keys with at least one handler.
    pub fn key_count(&self) -> usize {
        self.map.lock().len()
    }

    /// Run every handler registered for `key` against `data`.
    ///
    /// Iterates over a snapshot taken before the first call, so handlers may
    /// register or remove handlers. Errors and panics are logged per handler.
    /// Returns the number of handlers that completed successfully.
    pub fn dispatch(&self, key: &EventKey, data: &Value) -> usize {
        let handlers = self.snapshot(key);
        if handlers.is_empty() {
            trace!(event = %key, "no handlers registered");
            return 0;
        }

        let mut ok = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.call(data))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => warn!(event = %key, error = %e, "handler failed"),
                Err(_) => error!(event = %key, "handler panicked"),
            }
        }
        ok
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
