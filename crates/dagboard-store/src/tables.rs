//! Generic admin tables.
//!
//! Loading a model reads its permissions first. With `get_structure` the
//! field structure follows, and every field that aliases another table
//! loads that table too. With `view` the rows are fetched last. Each model
//! is loaded at most once.

use std::collections::HashMap;
use std::sync::Arc;

use dagboard_api::ApiClient;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;

/// What the client knows about one model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableData {
    /// Permissions of the current user (`get_structure`, `view`, ...).
    pub permissions: Option<Value>,
    /// Field descriptions.
    pub structure: Option<Vec<Value>>,
    /// Rows.
    pub items: Option<Value>,
}

impl TableData {
    fn allows(&self, permission: &str) -> bool {
        self.permissions
            .as_ref()
            .and_then(|p| p.get(permission))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Alias target of a structure field.
fn alias_target(field: &Value) -> Option<&str> {
    let element = field.get("element")?;
    if element.get("type").and_then(Value::as_str) != Some("alias") {
        return None;
    }
    element.get("table").and_then(Value::as_str)
}

/// Cache of loaded tables.
pub struct TablesStore {
    api: Arc<ApiClient>,
    tables: RwLock<HashMap<String, TableData>>,
}

impl TablesStore {
    /// Empty cache.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Load `model` and the tables it aliases. Known models are skipped.
    ///
    /// A failed load forgets the model so it can be requested again.
    pub fn load<'a>(&'a self, model: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            {
                let mut tables = self.tables.write();
                if tables.contains_key(model) {
                    return Ok(());
                }
                let _ = tables.insert(model.to_string(), TableData::default());
            }
            let loaded = self.fetch(model).await;
            if let Err(e) = &loaded {
                warn!(model, error = %e, "table load failed");
                let _ = self.tables.write().remove(model);
            }
            loaded
        }
        .boxed()
    }

    async fn fetch(&self, model: &str) -> Result<()> {
        let permissions: Value = self
            .api
            .get_json(&format!("/api/permissions/{model}/my"))
            .await?;
        let table = TableData {
            permissions: Some(permissions),
            ..TableData::default()
        };
        let (get_structure, view) = (table.allows("get_structure"), table.allows("view"));
        self.update(model, |t| t.permissions.clone_from(&table.permissions));
        if !get_structure {
            debug!(model, "structure not permitted");
            return Ok(());
        }

        let structure: Vec<Value> = self.api.get_json(&format!("/api/structure/{model}")).await?;
        let aliases: Vec<String> = structure
            .iter()
            .filter_map(alias_target)
            .map(str::to_string)
            .collect();
        self.update(model, |t| t.structure = Some(structure));
        for alias in &aliases {
            self.load(alias).await?;
        }

        if view {
            let items: Value = self.api.get_json(&format!("/api/{model}")).await?;
            self.update(model, |t| t.items = Some(items));
        }
        debug!(model, aliases = aliases.len(), "table loaded");
        Ok(())
    }

    fn update(&self, model: &str, apply: impl FnOnce(&mut TableData)) {
        if let Some(table) = self.tables.write().get_mut(model) {
            apply(table);
        }
    }

    /// Loaded data of `model`.
    pub fn table(&self, model: &str) -> Option<TableData> {
        self.tables.read().get(model).cloned()
    }

    /// Names of every known model.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.tables.read().keys().cloned().collect();
        models.sort();
        models
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
