//! Live port values.
//!
//! `/api/live/ports` returns `{port_id: {value, value_raw, ts}}` plus a
//! reserved entry `"0"` whose `ts` is the server clock. The difference to the
//! local clock is kept as `ts_delta` and added to every server timestamp
//! before computing ages. `port:in` events keep values current and pull
//! `ts_delta` forward whenever a timestamp from the future arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dagboard_api::ApiClient;
use dagboard_channel::{ChannelClient, Handler};
use dagboard_core::{EntityId, EventAction, EventGroup, EventKey, HandlerError};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::init::{CollectionState, InitGuard};
use crate::resync::Refresh;

const PORTS_PATH: &str = "/api/live/ports";
const CLOCK_ENTRY: &str = "0";
const LOAD_FAILED: &str = "Failed to load ports.";

/// Source of the local wall clock in seconds since the epoch.
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// The system wall clock.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis() as f64 / 1000.0)
}

/// Last known value of one port.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortValue {
    /// Display value.
    #[serde(default)]
    pub value: Value,
    /// Raw value as read from the device.
    #[serde(default)]
    pub value_raw: Value,
    /// Server timestamp in seconds; `0` when unknown.
    #[serde(default, deserialize_with = "ts_or_zero")]
    pub ts: f64,
}

fn ts_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

/// A port value with its timestamp moved onto the local clock.
#[derive(Clone, Debug, PartialEq)]
pub struct PortReading {
    /// The stored value.
    pub port: PortValue,
    /// `ts + ts_delta`, or `None` when the timestamp is unknown.
    pub corrected_ts: Option<f64>,
}

/// Render an age in seconds as `"{h}h {m}m"`, `"{m}m {s}s"` or `"{s}s"`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_age(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (hours, minutes, secs) = (total / 3600, total % 3600 / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

struct PortsState {
    ports: RwLock<HashMap<EntityId, PortValue>>,
    ts_delta: RwLock<f64>,
    clock: Clock,
}

impl PortsState {
    fn on_port_in(&self, data: &Value) -> std::result::Result<(), HandlerError> {
        let pin = data
            .get("pin_id")
            .ok_or_else(|| HandlerError::payload("port event without pin_id"))?;
        let id = EntityId::from_value(pin)?;
        let reading = PortValue::deserialize(data)?;

        let delta = (self.clock)() - reading.ts;
        if delta < 0.0 {
            *self.ts_delta.write() += delta;
            warn!(correction = delta, "server clock ahead; corrected ts_delta");
        }
        let _ = self.ports.write().insert(id, reading);
        Ok(())
    }

    fn apply_snapshot(&self, mut snapshot: Map<String, Value>) {
        if let Some(server_ts) = snapshot
            .remove(CLOCK_ENTRY)
            .and_then(|entry| entry.get("ts").and_then(Value::as_f64))
            .filter(|ts| *ts != 0.0)
        {
            *self.ts_delta.write() = (self.clock)() - server_ts;
        }

        let mut ports = self.ports.write();
        for (id, entry) in snapshot {
            let incoming = match PortValue::deserialize(&entry) {
                Ok(port) => port,
                Err(e) => {
                    warn!(port = %id, error = %e, "skipping malformed port entry");
                    continue;
                }
            };
            let id = EntityId::from(id);
            // A live event may have arrived while the snapshot was in flight.
            let stale = ports.get(&id).is_some_and(|current| current.ts > incoming.ts);
            if !stale {
                let _ = ports.insert(id, incoming);
            }
        }
    }
}

/// Mirror of live port values.
pub struct PortsStore {
    api: Arc<ApiClient>,
    channel: ChannelClient,
    init: InitGuard,
    subscribed: AtomicBool,
    state: Arc<PortsState>,
}

impl PortsStore {
    /// Store on the system clock.
    pub fn new(api: Arc<ApiClient>, channel: ChannelClient) -> Self {
        Self::with_clock(api, channel, system_clock())
    }

    /// Store on an explicit clock.
    pub fn with_clock(api: Arc<ApiClient>, channel: ChannelClient, clock: Clock) -> Self {
        Self {
            api,
            channel,
            init: InitGuard::new(),
            subscribed: AtomicBool::new(false),
            state: Arc::new(PortsState {
                ports: RwLock::new(HashMap::new()),
                ts_delta: RwLock::new(0.0),
                clock,
            }),
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> CollectionState {
        self.init.state()
    }

    /// Subscribe to `port:in`, then load the snapshot.
    ///
    /// The subscription comes first so no update is missed during the fetch.
    pub async fn initialize(&self) -> Result<()> {
        self.subscribe();
        self.init
            .run(|| async {
                self.load().await?;
                info!(ports = self.len(), "ports store ready");
                Ok(())
            })
            .await
    }

    fn subscribe(&self) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = Arc::clone(&self.state);
        self.channel.on_message(
            EventKey::new(EventGroup::Port, EventAction::In),
            Handler::new(move |data| state.on_port_in(data)),
        );
    }

    async fn load(&self) -> Result<()> {
        let snapshot = match self.api.get_json::<Map<String, Value>>(PORTS_PATH).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "ports fetch failed");
                let _ = self.api.messages().error(LOAD_FAILED);
                return Err(e.into());
            }
        };
        self.state.apply_snapshot(snapshot);
        debug!(ports = self.len(), ts_delta = self.ts_delta(), "ports loaded");
        Ok(())
    }

    /// Port `id` with its corrected timestamp.
    pub fn port(&self, id: impl Into<EntityId>) -> Option<PortReading> {
        let port = self.state.ports.read().get(&id.into()).cloned()?;
        let corrected_ts = (port.ts != 0.0).then(|| port.ts + self.ts_delta());
        Some(PortReading { port, corrected_ts })
    }

    /// Number of known ports.
    pub fn len(&self) -> usize {
        self.state.ports.read().len()
    }

    /// Whether no port is known.
    pub fn is_empty(&self) -> bool {
        self.state.ports.read().is_empty()
    }

    /// Local clock minus server clock, in seconds.
    pub fn ts_delta(&self) -> f64 {
        *self.state.ts_delta.read()
    }

    /// Age of server timestamp `ts` on the local clock; empty when `ts` is 0.
    pub fn age(&self, ts: f64) -> String {
        if ts == 0.0 {
            return String::new();
        }
        format_age((self.state.clock)() - (ts + self.ts_delta()))
    }
}

#[async_trait]
impl Refresh for PortsStore {
    fn name(&self) -> &'static str {
        "ports"
    }

    async fn refresh(&self) -> Result<()> {
        if !self.init.is_ready() {
            return Ok(());
        }
        self.load().await
    }
}

impl std::fmt::Debug for PortsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortsStore")
            .field("state", &self.state())
            .field("ports", &self.len())
            .field("ts_delta", &self.ts_delta())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
