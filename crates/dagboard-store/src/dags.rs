//! Dags, templates and the block catalogs.
//!
//! The store mirrors four server collections:
//!
//! - **dags** (`/api/dags`), keyed by canonical id and kept live by `dag:*` events
//! - **templates** (`/api/templates`), keyed by `(name, version)` and kept
//!   live by `template:add` / `template:update`
//! - **catalog** (`/api/list/dags`) and **pins** (`/api/list/pins`), loaded once
//!
//! Graph mutations go to the server on server pages and are applied locally
//! only after the server confirmed them. On a template page they edit the
//! page's [`TemplateDraft`] instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dagboard_api::{ApiClient, ApiError, Method, RequestOptions};
use dagboard_channel::{ChannelClient, Handler};
use dagboard_core::{EntityId, EventAction, EventGroup, EventKey, HandlerError, MessageKind};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::collection::MirroredCollection;
use crate::errors::{Result, StoreError};
use crate::init::{CollectionState, InitGuard};
use crate::page::{Page, TemplateKey};
use crate::resync::Refresh;
use crate::template::{Link, NodeGroup, Position, TemplateDraft};

const DAGS_PATH: &str = "/api/dags";
const TEMPLATES_PATH: &str = "/api/templates";
const CATALOG_PATH: &str = "/api/list/dags";
const PINS_PATH: &str = "/api/list/pins";

const LOAD_FAILED: &str = "Failed to load data.";
const ADD_DAG_FAILED: &str = "Failed to add dag.";
const REMOVE_DAG_FAILED: &str = "Failed to remove dag.";
const UPDATE_DAG_FAILED: &str = "Failed to update dag.";
const SET_PARAMS_FAILED: &str = "Failed to set parameters.";
const ADD_CONNECTION_FAILED: &str = "Failed to add connection.";
const DELETE_CONNECTION_FAILED: &str = "Failed to delete connection.";
const ADD_TEMPLATE_FAILED: &str = "Failed to add template.";
const SAVE_TEMPLATE_FAILED: &str = "Failed to save template.";

/// Catalog names with this prefix add a template slot (`tpl.input`).
const SLOT_PREFIX: &str = "tpl.";

type HandlerResult = std::result::Result<(), HandlerError>;

/// A new connection between two dag ports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Connection {
    /// Source node.
    pub from_id: String,
    /// Source port.
    pub from_port: String,
    /// Target node.
    pub to_id: String,
    /// Kind of the target port (`in`, `params`, ...).
    pub to_type: String,
    /// Target port.
    pub to_port: String,
}

/// An edge as the graph editor names it.
///
/// `source_handle` is `<kind>_<port>`; `target_handle` is `<kind>_<port>`
/// where the port itself may contain underscores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    /// Source node.
    pub source: String,
    /// Source handle.
    pub source_handle: String,
    /// Target node.
    pub target: String,
    /// Target handle.
    pub target_handle: String,
}

impl EdgeRef {
    fn source_port(&self) -> &str {
        self.source_handle.split('_').nth(1).unwrap_or_default()
    }

    fn target_parts(&self) -> (&str, &str) {
        self.target_handle
            .split_once('_')
            .unwrap_or((self.target_handle.as_str(), ""))
    }
}

#[derive(Debug, Default)]
struct DagsState {
    dags: MirroredCollection,
    templates: RwLock<Vec<Value>>,
    catalog: RwLock<Vec<Value>>,
    pins: RwLock<Vec<Value>>,
    drafts: RwLock<HashMap<TemplateKey, TemplateDraft>>,
    page: RwLock<Page>,
}

impl DagsState {
    fn on_dag_upsert(&self, data: &Value) -> HandlerResult {
        let id = self.dags.upsert(data.clone())?;
        debug!(dag = %id, "dag upserted");
        Ok(())
    }

    fn on_dag_params(&self, data: &Value) -> HandlerResult {
        let id = EntityId::from_record(data)?;
        let params = data
            .get("params")
            .and_then(Value::as_object)
            .ok_or_else(|| HandlerError::payload("update_params without a params object"))?;
        if !self.dags.merge_field(&id, "params", params) {
            debug!(dag = %id, "params for unknown dag ignored");
        }
        Ok(())
    }

    fn on_dag_remove(&self, data: &Value) -> HandlerResult {
        let id = match data {
            Value::Object(_) => EntityId::from_record(data)?,
            other => EntityId::from_value(other)?,
        };
        if self.dags.remove(&id).is_some() {
            debug!(dag = %id, "dag removed");
        }
        Ok(())
    }

    fn on_template_upsert(&self, data: &Value) -> HandlerResult {
        let key = template_key(data).ok_or_else(|| HandlerError::payload("template without a name"))?;
        upsert_template(&mut self.templates.write(), &key, data.clone());
        Ok(())
    }
}

fn template_key(record: &Value) -> Option<TemplateKey> {
    let name = record.get("name")?.as_str()?;
    let version = match record.get("version") {
        Some(Value::String(v)) => v.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    Some(TemplateKey::new(name, version))
}

fn upsert_template(templates: &mut Vec<Value>, key: &TemplateKey, record: Value) {
    match templates
        .iter_mut()
        .find(|t| template_key(t).as_ref() == Some(key))
    {
        Some(existing) => *existing = record,
        None => templates.push(record),
    }
}

fn find_by_name(items: &[Value], name: &str) -> Option<Value> {
    items
        .iter()
        .find(|item| item.get("name").and_then(Value::as_str) == Some(name))
        .cloned()
}

/// Reject an answer whose `code` is not `ok`.
fn check_answer(answer: &Value) -> std::result::Result<(), ApiError> {
    let code = answer.get("code").and_then(Value::as_str).unwrap_or("error");
    if code == "ok" {
        return Ok(());
    }
    let message = answer
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Request rejected.");
    Err(ApiError::Rejected {
        code: code.to_string(),
        message: message.to_string(),
    })
}

/// Mirror of the dag graph, templates and catalogs.
pub struct DagsStore {
    api: Arc<ApiClient>,
    channel: ChannelClient,
    init: InitGuard,
    state: Arc<DagsState>,
}

impl DagsStore {
    /// Store bound to `api` and `channel`. Nothing is fetched until
    /// [`initialize`](Self::initialize).
    pub fn new(api: Arc<ApiClient>, channel: ChannelClient) -> Self {
        Self {
            api,
            channel,
            init: InitGuard::new(),
            state: Arc::new(DagsState::default()),
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> CollectionState {
        self.init.state()
    }

    /// Bulk-fetch every collection, then subscribe to channel events.
    ///
    /// Runs once; concurrent callers share the in-flight fetch and a failed
    /// fetch can be retried.
    pub async fn initialize(&self) -> Result<()> {
        self.init
            .run(|| async {
                self.load().await?;
                self.register_handlers();
                info!(dags = self.state.dags.len(), "dags store ready");
                Ok(())
            })
            .await
    }

    async fn load(&self) -> Result<()> {
        let fetched = tokio::try_join!(
            self.api.get_json::<Vec<Value>>(DAGS_PATH),
            self.api.get_json::<Vec<Value>>(TEMPLATES_PATH),
            self.api.get_json::<Vec<Value>>(CATALOG_PATH),
            self.api.get_json::<Vec<Value>>(PINS_PATH),
        );
        let (dags, templates, catalog, pins) = match fetched {
            Ok(collections) => collections,
            Err(e) => {
                warn!(error = %e, "dags bulk fetch failed");
                let _ = self.api.messages().error(LOAD_FAILED);
                return Err(e.into());
            }
        };
        let kept = self.state.dags.replace_all(dags);
        *self.state.templates.write() = templates;
        *self.state.catalog.write() = catalog;
        *self.state.pins.write() = pins;
        debug!(dags = kept, "dags loaded");
        Ok(())
    }

    fn register_handlers(&self) {
        let handlers: [(EventKey, fn(&DagsState, &Value) -> HandlerResult); 6] = [
            (EventKey::new(EventGroup::Dag, EventAction::Add), DagsState::on_dag_upsert),
            (EventKey::new(EventGroup::Dag, EventAction::Update), DagsState::on_dag_upsert),
            (EventKey::new(EventGroup::Dag, EventAction::UpdateParams), DagsState::on_dag_params),
            (EventKey::new(EventGroup::Dag, EventAction::Remove), DagsState::on_dag_remove),
            (EventKey::new(EventGroup::Template, EventAction::Add), DagsState::on_template_upsert),
            (EventKey::new(EventGroup::Template, EventAction::Update), DagsState::on_template_upsert),
        ];
        for (key, handle) in handlers {
            let state = Arc::clone(&self.state);
            self.channel
                .on_message(key, Handler::new(move |data| handle(&state, data)));
        }
    }

    fn reported<T>(&self, context: &'static str, result: dagboard_api::Result<T>) -> Result<T> {
        result.map_err(|e| {
            warn!(error = %e, context, "dags request failed");
            let _ = self.api.messages().error(context);
            StoreError::from(e)
        })
    }

    fn rejected(&self, err: ApiError) -> StoreError {
        if let ApiError::Rejected { code, message } = &err {
            let _ = self
                .api
                .messages()
                .add(MessageKind::from(code.as_str()), message.clone());
        }
        StoreError::from(err)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Dag with `id`.
    pub fn dag(&self, id: impl Into<EntityId>) -> Option<Value> {
        self.state.dags.get(&id.into())
    }

    /// All dags in server order.
    pub fn dags(&self) -> Vec<Value> {
        self.state.dags.values()
    }

    /// Catalog entry for the block `name`.
    pub fn catalog_entry(&self, name: &str) -> Option<Value> {
        find_by_name(&self.state.catalog.read(), name)
    }

    /// The whole block catalog.
    pub fn catalog(&self) -> Vec<Value> {
        self.state.catalog.read().clone()
    }

    /// Pin description for `name`.
    pub fn pin(&self, name: &str) -> Option<Value> {
        find_by_name(&self.state.pins.read(), name)
    }

    /// All pins.
    pub fn pins(&self) -> Vec<Value> {
        self.state.pins.read().clone()
    }

    /// Template `name` at `version`.
    pub fn template(&self, name: &str, version: &str) -> Option<Value> {
        let key = TemplateKey::new(name, version);
        self.state
            .templates
            .read()
            .iter()
            .find(|t| template_key(t).as_ref() == Some(&key))
            .cloned()
    }

    /// All templates.
    pub fn templates(&self) -> Vec<Value> {
        self.state.templates.read().clone()
    }

    // ── Pages and drafts ────────────────────────────────────────────────────

    /// Page graph operations currently apply to.
    pub fn page(&self) -> Page {
        self.state.page.read().clone()
    }

    /// Switch pages. Template pages need an open draft, see
    /// [`open_template`](Self::open_template).
    pub fn set_page(&self, page: Page) {
        debug!(page = %page, "page selected");
        *self.state.page.write() = page;
    }

    /// Open a draft of template `name`/`version` and switch to its page.
    ///
    /// An already open draft keeps its unsaved edits. A template the server
    /// does not know yet starts empty.
    pub fn open_template(&self, name: &str, version: &str) -> Result<()> {
        let key = TemplateKey::new(name, version);
        if !self.state.drafts.read().contains_key(&key) {
            let draft = match self.template(name, version) {
                Some(record) => TemplateDraft::from_record(key.clone(), &record)
                    .map_err(|e| StoreError::Payload(e.to_string()))?,
                None => TemplateDraft::new(key.clone()),
            };
            let _ = self.state.drafts.write().entry(key.clone()).or_insert(draft);
        }
        self.set_page(Page::Template(key));
        Ok(())
    }

    /// Snapshot of the draft for `key`.
    pub fn draft(&self, key: &TemplateKey) -> Option<TemplateDraft> {
        self.state.drafts.read().get(key).cloned()
    }

    fn current_template(&self) -> Option<TemplateKey> {
        self.state.page.read().template_key().cloned()
    }

    fn with_draft<R>(&self, key: &TemplateKey, edit: impl FnOnce(&mut TemplateDraft) -> R) -> Result<R> {
        let mut drafts = self.state.drafts.write();
        let draft = drafts
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownDraft(key.to_string()))?;
        Ok(edit(draft))
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Add block `name` at `position`. Returns the new node id.
    ///
    /// On a template page a `tpl.<group>` name adds a slot of that group.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn add_dag(&self, name: &str, position: Position) -> Result<String> {
        if let Some(key) = self.current_template() {
            let catalog_entry = self.catalog_entry(name);
            return self.with_draft(&key, |draft| match name.strip_prefix(SLOT_PREFIX) {
                Some(group) => draft
                    .add_slot(NodeGroup::from_name(group), position)
                    .ok_or_else(|| StoreError::Payload(format!("not a slot group: {group}"))),
                None => Ok(draft.add_dag(name, position, catalog_entry.as_ref())),
            })?;
        }

        let body = json!({
            "dag_name": name,
            "position_x": position.x.floor() as i64,
            "position_y": position.y.floor() as i64,
            "page": self.page().to_string(),
        });
        let created: Value = self.reported(
            ADD_DAG_FAILED,
            self.api.send_json(Method::POST, "/api/dags/add", body).await,
        )?;
        let id = self
            .state
            .dags
            .upsert(created)
            .map_err(|e| StoreError::Payload(e.to_string()))?;
        info!(dag = %id, name, "dag added");
        Ok(id.into_inner())
    }

    /// Remove node `id`.
    pub async fn remove_dag(&self, id: &str) -> Result<()> {
        if let Some(key) = self.current_template() {
            return if self.with_draft(&key, |draft| draft.remove_node(id))? {
                Ok(())
            } else {
                Err(StoreError::UnknownNode(id.to_string()))
            };
        }

        self.reported(
            REMOVE_DAG_FAILED,
            self.api
                .send(Method::DELETE, &format!("/api/dags/{id}"), RequestOptions::default())
                .await,
        )?;
        let _ = self.state.dags.remove(&EntityId::from(id));
        info!(dag = id, "dag removed");
        Ok(())
    }

    /// Update top-level fields of dag `id`.
    ///
    /// On a template page only `position` is applied. Unknown dags are ignored.
    pub async fn update_dag(&self, id: &str, patch: &Map<String, Value>) -> Result<()> {
        if let Some(key) = self.current_template() {
            if let Some(position) = patch.get("position").and_then(Position::from_value) {
                let _ = self.with_draft(&key, |draft| draft.move_node(id, position))?;
            }
            return Ok(());
        }

        let entity = EntityId::from(id);
        if !self.state.dags.contains(&entity) {
            debug!(dag = id, "update for unknown dag ignored");
            return Ok(());
        }
        self.reported(
            UPDATE_DAG_FAILED,
            self.api
                .send(
                    Method::PUT,
                    &format!("/api/dags/{id}"),
                    RequestOptions::json(json!({ "params": patch })),
                )
                .await,
        )?;
        let _ = self.state.dags.merge(&entity, patch);
        Ok(())
    }

    /// Set parameters of node `id` in `group`.
    ///
    /// The server confirms through a later `dag:update_params` event.
    pub async fn set_params(&self, id: &str, group: NodeGroup, params: &Map<String, Value>) -> Result<()> {
        if let Some(key) = self.current_template() {
            return if self.with_draft(&key, |draft| draft.set_params(group, id, params))? {
                Ok(())
            } else {
                Err(StoreError::UnknownNode(id.to_string()))
            };
        }

        self.reported(
            SET_PARAMS_FAILED,
            self.api
                .send(
                    Method::POST,
                    &format!("/api/dags/{id}/params"),
                    RequestOptions::json(json!({ "params": params })),
                )
                .await,
        )
    }

    /// Connect two ports.
    pub async fn add_connection(&self, connection: &Connection) -> Result<()> {
        if let Some(key) = self.current_template() {
            let link = Link::new(&connection.to_type, &connection.to_id, &connection.to_port);
            return if self.with_draft(&key, |draft| {
                draft.connect(&connection.from_id, &connection.from_port, link)
            })? {
                Ok(())
            } else {
                Err(StoreError::UnknownNode(connection.from_id.clone()))
            };
        }

        let body = serde_json::to_value(connection).map_err(|e| StoreError::Payload(e.to_string()))?;
        self.reported(
            ADD_CONNECTION_FAILED,
            self.api
                .send(Method::POST, "/api/dags/connections", RequestOptions::json(body))
                .await,
        )
    }

    /// Delete an edge. Edges between dags this store does not know are ignored.
    pub async fn delete_connection(&self, edge: &EdgeRef) -> Result<()> {
        if let Some(key) = self.current_template() {
            let _ = self.with_draft(&key, |draft| {
                draft.disconnect(&edge.source, edge.source_port(), &edge.target)
            })?;
            return Ok(());
        }

        let known = |id: &str| self.state.dags.contains(&EntityId::from(id));
        if !known(&edge.source) || !known(&edge.target) {
            debug!(source = %edge.source, target = %edge.target, "edge between unknown dags ignored");
            return Ok(());
        }
        let (target_type, target_port) = edge.target_parts();
        let path = format!(
            "/api/dags/connections/{}/{}/{}/{}/{}",
            edge.source,
            edge.source_port(),
            target_type,
            edge.target,
            target_port
        );
        self.reported(
            DELETE_CONNECTION_FAILED,
            self.api.send(Method::DELETE, &path, RequestOptions::default()).await,
        )
    }

    /// Create a template. The server announces it with `template:add`.
    pub async fn add_template(&self, template: Value) -> Result<()> {
        let answer: Value = self.reported(
            ADD_TEMPLATE_FAILED,
            self.api.send_json(Method::POST, TEMPLATES_PATH, template).await,
        )?;
        check_answer(&answer).map_err(|e| self.rejected(e))
    }

    /// Save the draft of the current template page.
    ///
    /// Returns `false` when there was nothing to save or a save is already
    /// in flight.
    pub async fn save_template(&self) -> Result<bool> {
        let key = self.current_template().ok_or(StoreError::NotTemplatePage)?;
        let payload = self.with_draft(&key, |draft| {
            if draft.on_save || !draft.need_save {
                return None;
            }
            draft.on_save = true;
            Some(draft.save_payload())
        })?;
        let Some(payload) = payload else {
            let _ = self.api.messages().info("Template already saved.");
            return Ok(false);
        };

        let result = self
            .api
            .send_json::<Value>(Method::POST, "/api/templates/save", payload)
            .await;
        let outcome = result.and_then(|answer| check_answer(&answer));
        let saved = outcome.is_ok();
        let _ = self.with_draft(&key, |draft| {
            draft.on_save = false;
            if saved {
                draft.need_save = false;
            }
        });

        match outcome {
            Ok(()) => {
                info!(template = %key, "template saved");
                Ok(true)
            }
            Err(e @ ApiError::Rejected { .. }) => Err(self.rejected(e)),
            Err(e) => self.reported(SAVE_TEMPLATE_FAILED, Err(e)),
        }
    }

    /// Ask the orchestrator to persist the running graph.
    pub async fn save_dags(&self) -> Result<()> {
        let messages = self.api.messages();
        match self
            .api
            .send(Method::GET, "/api/orchestrator/save", RequestOptions::default())
            .await
        {
            Ok(()) => {
                let _ = messages.success("Dags saved.");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "orchestrator save failed");
                let _ = messages.error("Dags not saved.");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Refresh for DagsStore {
    fn name(&self) -> &'static str {
        "dags"
    }

    async fn refresh(&self) -> Result<()> {
        if !self.init.is_ready() {
            debug!("dags store not initialized; refresh skipped");
            return Ok(());
        }
        self.load().await
    }
}

impl std::fmt::Debug for DagsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagsStore")
            .field("state", &self.state())
            .field("dags", &self.state.dags.len())
            .field("page", &self.page())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
