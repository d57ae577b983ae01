//! Insertion-ordered mirror of server records.
//!
//! Records are keyed by their canonical [`EntityId`], so `7`, `"7"` and `7.0`
//! address the same entry. An upsert of a known id replaces the record in
//! place and keeps its position; a new id is appended.

use dagboard_core::{EntityId, IdError};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::warn;

/// Id → record mapping with interior locking.
#[derive(Debug, Default)]
pub struct MirroredCollection {
    items: RwLock<IndexMap<EntityId, Value>>,
}

impl MirroredCollection {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `record` under its canonical id.
    ///
    /// The stored record carries the canonical id as a string.
    pub fn upsert(&self, mut record: Value) -> Result<EntityId, IdError> {
        let id = EntityId::from_record(&record)?;
        if let Value::Object(fields) = &mut record {
            let _ = fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        let _ = self.items.write().insert(id.clone(), record);
        Ok(id)
    }

    /// Delete the record with `id`. Absent ids are ignored.
    pub fn remove(&self, id: &EntityId) -> Option<Value> {
        self.items.write().shift_remove(id)
    }

    /// Replace the whole content with `records`, keeping their order.
    ///
    /// Records without a usable id are skipped. Returns how many were kept.
    pub fn replace_all(&self, records: Vec<Value>) -> usize {
        let mut fresh = IndexMap::with_capacity(records.len());
        for mut record in records {
            match EntityId::from_record(&record) {
                Ok(id) => {
                    if let Value::Object(fields) = &mut record {
                        let _ = fields.insert("id".to_string(), Value::String(id.to_string()));
                    }
                    let _ = fresh.insert(id, record);
                }
                Err(e) => warn!(error = %e, "skipping record without id"),
            }
        }
        let kept = fresh.len();
        *self.items.write() = fresh;
        kept
    }

    /// Shallow-merge `patch` into the record's `field` object.
    ///
    /// Returns `false` when the record does not exist.
    pub fn merge_field(&self, id: &EntityId, field: &str, patch: &Map<String, Value>) -> bool {
        let mut items = self.items.write();
        let Some(Value::Object(record)) = items.get_mut(id) else {
            return false;
        };
        let target = record
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        if let Value::Object(target) = target {
            for (k, v) in patch {
                let _ = target.insert(k.clone(), v.clone());
            }
        }
        true
    }

    /// Shallow-merge `patch` into the record's top-level fields.
    pub fn merge(&self, id: &EntityId, patch: &Map<String, Value>) -> bool {
        let mut items = self.items.write();
        let Some(Value::Object(record)) = items.get_mut(id) else {
            return false;
        };
        for (k, v) in patch {
            if k != "id" {
                let _ = record.insert(k.clone(), v.clone());
            }
        }
        true
    }

    /// Record with `id`.
    pub fn get(&self, id: &EntityId) -> Option<Value> {
        self.items.read().get(id).cloned()
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.items.read().contains_key(id)
    }

    /// All records in order.
    pub fn values(&self) -> Vec<Value> {
        self.items.read().values().cloned().collect()
    }

    /// All ids in order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.items.read().keys().cloned().collect()
    }

    /// First record matching `pred`.
    pub fn find(&self, pred: impl Fn(&Value) -> bool) -> Option<Value> {
        self.items.read().values().find(|v| pred(v)).cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
