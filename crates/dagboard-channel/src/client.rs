//! The channel client.
//!
//! One [`ChannelClient`] owns at most one live transport. The connection
//! runs in a spawned task that dispatches frames one at a time; when the
//! transport closes the task consults the [`ReconnectPolicy`] and, while
//! budget remains, arms a retry timer for `N * base_delay`.
//!
//! State machine:
//!
//! ```text
//! disconnected ──connect()/retry──▶ connecting ──open──▶ connected
//!      ▲                               │                    │
//!      │                             error                close
//!      │                               ▼                    │
//!      ├────────── force close ─── error ◀──transport error─┤
//!      └────────────────────────────────────────────────────┘
//! ```
//!
//! All locks are `parking_lot` locks held only for short, non-async
//! sections; none is held while a handler runs.

use std::sync::Arc;

use dagboard_core::{ChannelEvent, EventKey, ReconnectPolicy};
use dagboard_settings::DagboardSettings;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::Result;
use crate::listeners::{Handler, Listeners};
use crate::state::ConnectionState;
use crate::transport::{Connector, WsConnector};

/// Transitions buffered per subscriber before it starts lagging.
const TRANSITION_BUFFER: usize = 64;

/// Cloneable handle to a reconnecting channel.
///
/// Clones share the transport, listeners and retry budget.
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    listeners: Listeners,
    state_tx: watch::Sender<ConnectionState>,
    transitions_tx: broadcast::Sender<ConnectionState>,
    opens_tx: watch::Sender<u64>,
    shut_down_tx: watch::Sender<bool>,
    runtime: Mutex<Runtime>,
}

#[derive(Default)]
struct Runtime {
    /// Consecutive closes that scheduled a retry since the last open.
    retries: u32,
    /// Bumped per attempt; a finishing task with an older value is stale.
    attempt: u64,
    connection: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
}

impl ChannelClient {
    /// Client for `url` using `connector` for transports.
    pub fn new(url: Url, policy: ReconnectPolicy, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        let (opens_tx, _) = watch::channel(0);
        let (shut_down_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                url,
                policy,
                connector,
                listeners: Listeners::new(),
                state_tx,
                transitions_tx,
                opens_tx,
                shut_down_tx,
                runtime: Mutex::new(Runtime::default()),
            }),
        }
    }

    /// WebSocket client for the configured server.
    pub fn from_settings(settings: &DagboardSettings) -> Result<Self> {
        let url = settings.server.ws_url()?;
        Ok(Self::new(url, settings.channel, Arc::new(WsConnector)))
    }

    /// Channel endpoint.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Reconnect policy.
    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch the latest connection state.
    ///
    /// Only the newest value is kept, so a short-lived state such as
    /// [`ConnectionState::Error`] may be skipped. Use
    /// [`subscribe_transitions`](Self::subscribe_transitions) to see every
    /// step.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Receive every state transition in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.transitions_tx.subscribe()
    }

    /// Watch the number of successful opens so far.
    ///
    /// A value above 1 means the channel has reconnected at least once.
    pub fn subscribe_opens(&self) -> watch::Receiver<u64> {
        self.inner.opens_tx.subscribe()
    }

    /// Watch whether [`shutdown`](Self::shutdown) was called since the last
    /// [`connect`](Self::connect).
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shut_down_tx.subscribe()
    }

    /// Retries used since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.inner.runtime.lock().retries
    }

    /// Open the channel unless it is open or opening.
    ///
    /// Cancels a pending retry timer. Must be called inside a tokio runtime.
    pub fn connect(&self) {
        let mut rt = self.inner.runtime.lock();
        if self.state().is_active() {
            debug!(state = %self.state(), "connect ignored");
            return;
        }
        if let Some(timer) = rt.retry_timer.take() {
            debug!("cancelling pending retry");
            timer.abort();
        }
        let _ = self.inner.shut_down_tx.send_replace(false);
        Inner::start_attempt(&self.inner, &mut rt);
    }

    /// Close the channel and cancel any pending retry.
    ///
    /// Registered handlers are kept; a later [`connect`](Self::connect)
    /// starts over with the remaining retry budget.
    pub fn shutdown(&self) {
        let mut rt = self.inner.runtime.lock();
        rt.attempt += 1;
        if let Some(timer) = rt.retry_timer.take() {
            timer.abort();
        }
        if let Some(task) = rt.connection.take() {
            task.abort();
        }
        drop(rt);
        self.inner.set_state(ConnectionState::Disconnected);
        let _ = self.inner.shut_down_tx.send_replace(true);
        info!(url = %self.inner.url, "channel shut down");
    }

    /// Register `handler` for frames with `key`.
    pub fn on_message(&self, key: EventKey, handler: Handler) {
        debug!(event = %key, "handler registered");
        self.inner.listeners.add(key, handler);
    }

    /// Remove the first registration of `handler` for `key`.
    pub fn off_message(&self, key: &EventKey, handler: &Handler) {
        if self.inner.listeners.remove(key, handler) {
            debug!(event = %key, "handler removed");
        }
    }

    /// Registrations for `key`.
    pub fn handler_count(&self, key: &EventKey) -> usize {
        self.inner.listeners.count(key)
    }

    /// Deliver a raw text frame as if it had arrived on the transport.
    pub fn dispatch_frame(&self, frame: &str) {
        self.inner.dispatch_frame(frame);
    }

    /// Deliver a parsed event to its handlers.
    pub fn dispatch_event(&self, event: &ChannelEvent) {
        let _ = self.inner.listeners.dispatch(&event.key(), &event.data);
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "channel state");
            let _ = self.transitions_tx.send(state);
        }
    }

    fn start_attempt(this: &Arc<Self>, rt: &mut Runtime) {
        rt.attempt += 1;
        let attempt = rt.attempt;
        this.set_state(ConnectionState::Connecting);
        let inner = Arc::clone(this);
        rt.connection = Some(tokio::spawn(async move {
            inner.run_connection(attempt).await;
        }));
    }

    async fn run_connection(self: Arc<Self>, attempt: u64) {
        debug!(url = %self.url, attempt, "connecting");
        match self.connector.connect(&self.url).await {
            Ok(mut frames) => {
                if !self.on_open(attempt) {
                    return;
                }
                while let Some(item) = frames.next().await {
                    match item {
                        Ok(frame) => self.dispatch_frame(&frame),
                        Err(e) => {
                            warn!(url = %self.url, error = %e, "channel transport error");
                            self.set_state(ConnectionState::Error);
                            break;
                        }
                    }
                }
                drop(frames);
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "channel connect failed");
                self.set_state(ConnectionState::Error);
            }
        }
        self.on_close(attempt);
    }

    fn on_open(&self, attempt: u64) -> bool {
        let mut rt = self.runtime.lock();
        if rt.attempt != attempt {
            return false;
        }
        rt.retries = 0;
        self.set_state(ConnectionState::Connected);
        self.opens_tx.send_modify(|n| *n += 1);
        info!(url = %self.url, "channel connected");
        true
    }

    fn on_close(self: &Arc<Self>, attempt: u64) {
        let mut rt = self.runtime.lock();
        if rt.attempt != attempt {
            return;
        }
        rt.connection = None;
        self.set_state(ConnectionState::Disconnected);

        let Some((retry, delay)) = self.policy.next_retry(rt.retries) else {
            error!(
                url = %self.url,
                retries = rt.retries,
                "channel retries exhausted; waiting for explicit connect"
            );
            return;
        };
        rt.retries = retry;
        warn!(
            url = %self.url,
            retry,
            max_retries = self.policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "channel closed; scheduling reconnect"
        );

        let inner = Arc::clone(self);
        rt.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut rt = inner.runtime.lock();
            // An explicit connect() already took the timer.
            if rt.retry_timer.take().is_none() || inner.state_tx.borrow().is_active() {
                return;
            }
            Self::start_attempt(&inner, &mut rt);
        }));
    }

    fn dispatch_frame(&self, frame: &str) {
        let event = match ChannelEvent::parse(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, frame_len = frame.len(), "dropping malformed frame");
                return;
            }
        };
        let key = event.key();
        let handled = self.listeners.dispatch(&key, &event.data);
        debug!(event = %key, handled, "frame dispatched");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
