//! Per-dag log history.
//!
//! `log` events (empty action) carrying a `dag_id` are appended to that
//! dag's history, capped at a fixed length with the oldest entries evicted
//! first. Events that also carry a `dag_port_id` become the latest entry for
//! that port in their direction (`in`, `out` or `params`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dagboard_channel::{ChannelClient, Handler};
use dagboard_core::constants::LOG_HISTORY_LIMIT;
use dagboard_core::{EntityId, EventAction, EventGroup, EventKey, HandlerError};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

/// Port direction of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input port.
    In,
    /// Output port.
    Out,
    /// Parameter port.
    Params,
}

impl Direction {
    /// Direction for a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "params" => Some(Self::Params),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct LogsState {
    limit: usize,
    by_dag: RwLock<HashMap<EntityId, VecDeque<Value>>>,
    by_port: RwLock<HashMap<(EntityId, Direction, EntityId), Value>>,
}

impl LogsState {
    fn on_log(&self, data: &Value) -> Result<(), HandlerError> {
        let dag = data
            .get("dag_id")
            .ok_or_else(|| HandlerError::payload("log entry without dag_id"))?;
        let dag = EntityId::from_value(dag)?;

        {
            let mut by_dag = self.by_dag.write();
            let history = by_dag.entry(dag.clone()).or_default();
            history.push_back(data.clone());
            while history.len() > self.limit {
                let _ = history.pop_front();
            }
        }

        if let Some(port) = data.get("dag_port_id") {
            let port = EntityId::from_value(port)?;
            let direction = data
                .get("direction")
                .and_then(Value::as_str)
                .and_then(Direction::from_name)
                .ok_or_else(|| HandlerError::payload("port log entry without a known direction"))?;
            let _ = self
                .by_port
                .write()
                .insert((dag.clone(), direction, port), data.clone());
        }
        trace!(dag = %dag, "log entry recorded");
        Ok(())
    }
}

/// Bounded log history fed by the channel.
pub struct LogsStore {
    channel: ChannelClient,
    subscribed: AtomicBool,
    state: Arc<LogsState>,
}

impl LogsStore {
    /// Store keeping the default number of entries per dag.
    pub fn new(channel: ChannelClient) -> Self {
        Self::with_limit(channel, LOG_HISTORY_LIMIT)
    }

    /// Store keeping at most `limit` entries per dag.
    pub fn with_limit(channel: ChannelClient, limit: usize) -> Self {
        Self {
            channel,
            subscribed: AtomicBool::new(false),
            state: Arc::new(LogsState {
                limit: limit.max(1),
                ..LogsState::default()
            }),
        }
    }

    /// Subscribe to log events. Later calls are no-ops.
    pub fn initialize(&self) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = Arc::clone(&self.state);
        self.channel.on_message(
            EventKey::new(EventGroup::Log, EventAction::Unspecified),
            Handler::new(move |data| state.on_log(data)),
        );
        debug!(limit = self.state.limit, "logs store subscribed");
    }

    /// Entries of dag `id`, oldest first.
    pub fn history(&self, id: impl Into<EntityId>) -> Vec<Value> {
        self.state
            .by_dag
            .read()
            .get(&id.into())
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Newest entry of dag `id`.
    pub fn latest(&self, id: impl Into<EntityId>) -> Option<Value> {
        self.state.by_dag.read().get(&id.into())?.back().cloned()
    }

    /// Latest entry for `port` of dag `id` in `direction`.
    pub fn port_log(
        &self,
        id: impl Into<EntityId>,
        direction: Direction,
        port: impl Into<EntityId>,
    ) -> Option<Value> {
        self.state
            .by_port
            .read()
            .get(&(id.into(), direction, port.into()))
            .cloned()
    }

    /// Latest entries of every port of dag `id` in `direction`.
    pub fn port_logs(&self, id: impl Into<EntityId>, direction: Direction) -> HashMap<EntityId, Value> {
        let id = id.into();
        self.state
            .by_port
            .read()
            .iter()
            .filter(|((dag, dir, _), _)| *dag == id && *dir == direction)
            .map(|((_, _, port), entry)| (port.clone(), entry.clone()))
            .collect()
    }

    /// Maximum entries kept per dag.
    pub fn limit(&self) -> usize {
        self.state.limit
    }
}

impl std::fmt::Debug for LogsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogsStore")
            .field("limit", &self.state.limit)
            .field("dags", &self.state.by_dag.read().len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::channel;

    fn log(data: &Value) -> String {
        json!({"type": "log", "data": data}).to_string()
    }

    fn store() -> LogsStore {
        let store = LogsStore::new(channel());
        store.initialize();
        store
    }

    #[test]
    fn history_is_capped_fifo() {
        let store = store();
        for n in 0..1001 {
            store.channel.dispatch_frame(&log(&json!({"dag_id": 1, "n": n})));
        }
        let history = store.history(1_i64);
        assert_eq!(history.len(), 1000);
        assert_eq!(history[0]["n"], 1);
        assert_eq!(store.latest("1").unwrap()["n"], 1000);
    }

    #[test]
    fn string_and_numeric_dag_ids_share_history() {
        let store = store();
        store.channel.dispatch_frame(&log(&json!({"dag_id": "3", "msg": "a"})));
        store.channel.dispatch_frame(&log(&json!({"dag_id": 3, "msg": "b"})));
        assert_eq!(store.history("3").len(), 2);
    }

    #[test]
    fn entries_without_dag_are_dropped() {
        let store = store();
        store.channel.dispatch_frame(&log(&json!({"msg": "orphan"})));
        store
            .channel
            .dispatch_frame(&json!({"type": "log", "action": "other", "data": {"dag_id": 1}}).to_string());
        assert!(store.history(1_i64).is_empty());
    }

    #[test]
    fn port_entries_track_latest_per_direction() {
        let store = store();
        for (port, direction, value) in [(10, "in", 1), (10, "in", 2), (10, "out", 3), (11, "params", 4)] {
            store.channel.dispatch_frame(&log(&json!({
                "dag_id": 1, "dag_port_id": port, "direction": direction, "value": value
            })));
        }
        assert_eq!(store.port_log(1_i64, Direction::In, 10_i64).unwrap()["value"], 2);
        assert_eq!(store.port_log(1_i64, Direction::Out, 10_i64).unwrap()["value"], 3);
        assert!(store.port_log(1_i64, Direction::Out, 11_i64).is_none());
        assert_eq!(store.port_logs(1_i64, Direction::Params).len(), 1);
        assert_eq!(store.history(1_i64).len(), 4);
    }

    #[test]
    fn custom_limit_and_single_subscription() {
        let store = LogsStore::with_limit(channel(), 2);
        store.initialize();
        store.initialize();
        for n in 0..5 {
            store.channel.dispatch_frame(&log(&json!({"dag_id": 9, "n": n})));
        }
        let ns: Vec<_> = store.history(9_i64).iter().map(|e| e["n"].clone()).collect();
        assert_eq!(ns, vec![json!(3), json!(4)]);
    }
}
