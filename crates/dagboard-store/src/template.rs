//! Local template editing.
//!
//! A template graph has four node groups: `input`, `output` and `param`
//! slots plus the `dags` it wires together. Slot ids carry their group as a
//! prefix (`input_ab12cd34e`); anything else is a dag node. Connections are
//! stored on the source node as `outputs[port] = [[to_type, to_id, to_port], ...]`.
//!
//! Every mutation marks the draft as needing a save.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::page::TemplateKey;

/// Node group of a template graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeGroup {
    /// Template inputs.
    Input,
    /// Template outputs.
    Output,
    /// Template parameters.
    Param,
    /// Dags inside the template.
    Dags,
}

impl NodeGroup {
    /// Every group, in serialization order.
    pub const ALL: [Self; 4] = [Self::Input, Self::Output, Self::Param, Self::Dags];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Param => "param",
            Self::Dags => "dags",
        }
    }

    /// Group for a name; unknown names mean [`NodeGroup::Dags`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "input" => Self::Input,
            "output" => Self::Output,
            "param" => Self::Param,
            _ => Self::Dags,
        }
    }

    /// Group a node id belongs to, from its prefix.
    #[must_use]
    pub fn of_node(id: &str) -> Self {
        Self::from_name(id.split('_').next().unwrap_or_default())
    }

    /// Whether this is one of the slot groups.
    #[must_use]
    pub fn is_slot(self) -> bool {
        self != Self::Dags
    }

    /// Fields a freshly added slot starts with.
    #[must_use]
    pub fn slot_defaults(self) -> Option<Map<String, Value>> {
        let defaults = match self {
            Self::Input => json!({"group": "input", "name": "default", "description": "Input data"}),
            Self::Output => {
                json!({"group": "output", "name": "default", "description": "Output data"})
            }
            Self::Param => json!({
                "group": "param",
                "name": "params",
                "description": "Parameter description",
                "public": true
            }),
            Self::Dags => return None,
        };
        match defaults {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position, serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Position snapped to whole canvas units.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.floor(),
            y: y.floor(),
        }
    }

    /// Parse an `[x, y]` array or an `{x, y}` object.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(arr) => Some(Self::new(arr.first()?.as_f64()?, arr.get(1)?.as_f64()?)),
            Value::Object(obj) => Some(Self::new(obj.get("x")?.as_f64()?, obj.get("y")?.as_f64()?)),
            _ => None,
        }
    }
}

impl From<[f64; 2]> for Position {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.x, p.y]
    }
}

/// One outgoing connection: target type, target node, target port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// Kind of the target port.
    pub to_type: String,
    /// Target node id.
    pub to_id: String,
    /// Target port name.
    pub to_port: String,
}

impl Link {
    /// Build a link.
    pub fn new(
        to_type: impl Into<String>,
        to_id: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            to_type: to_type.into(),
            to_id: to_id.into(),
            to_port: to_port.into(),
        }
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [&self.to_type, &self.to_id, &self.to_port].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<Value>::deserialize(deserializer)?;
        let [to_type, to_id, to_port] = parts.as_slice() else {
            return Err(serde::de::Error::custom(format!(
                "link must have 3 elements, got {}",
                parts.len()
            )));
        };
        Ok(Self::new(value_text(to_type), value_text(to_id), value_text(to_port)))
    }
}

/// String content of `value`, or its JSON text for non-strings.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A node of the template graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    /// Node id; slot ids start with their group name.
    pub id: String,
    /// Canvas position.
    #[serde(default)]
    pub position: Position,
    /// Outgoing connections per source port.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Vec<Link>>,
    /// Parameter values.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    /// Everything else (`name`, `group`, `description`, `public`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TemplateNode {
    /// Set a named field. `id` and `outputs` cannot be set this way.
    pub fn set_field(&mut self, key: &str, value: Value) -> bool {
        match key {
            "id" | "outputs" => false,
            "position" => match Position::from_value(&value) {
                Some(position) => {
                    self.position = position;
                    true
                }
                None => false,
            },
            "params" => match value {
                Value::Object(params) => {
                    self.params = params;
                    true
                }
                _ => false,
            },
            _ => {
                let _ = self.fields.insert(key.to_string(), value);
                true
            }
        }
    }

    fn drop_links_to(&mut self, target: &str) {
        for links in self.outputs.values_mut() {
            links.retain(|l| l.to_id != target);
        }
    }
}

/// The four node groups of a template.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateGraph {
    /// Input slots.
    #[serde(default)]
    pub input: Vec<TemplateNode>,
    /// Output slots.
    #[serde(default)]
    pub output: Vec<TemplateNode>,
    /// Parameter slots.
    #[serde(default)]
    pub param: Vec<TemplateNode>,
    /// Dag nodes.
    #[serde(default)]
    pub dags: Vec<TemplateNode>,
}

impl TemplateGraph {
    /// Nodes of `group`.
    #[must_use]
    pub fn group(&self, group: NodeGroup) -> &[TemplateNode] {
        match group {
            NodeGroup::Input => &self.input,
            NodeGroup::Output => &self.output,
            NodeGroup::Param => &self.param,
            NodeGroup::Dags => &self.dags,
        }
    }

    fn group_mut(&mut self, group: NodeGroup) -> &mut Vec<TemplateNode> {
        match group {
            NodeGroup::Input => &mut self.input,
            NodeGroup::Output => &mut self.output,
            NodeGroup::Param => &mut self.param,
            NodeGroup::Dags => &mut self.dags,
        }
    }

    /// Node `id` in `group`.
    #[must_use]
    pub fn node(&self, group: NodeGroup, id: &str) -> Option<&TemplateNode> {
        self.group(group).iter().find(|n| n.id == id)
    }

    fn node_mut(&mut self, group: NodeGroup, id: &str) -> Option<&mut TemplateNode> {
        self.group_mut(group).iter_mut().find(|n| n.id == id)
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        NodeGroup::ALL.iter().map(|g| self.group(*g).len()).sum()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Editable copy of a template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateDraft {
    /// Template identity.
    pub key: TemplateKey,
    /// Optional subtitle.
    pub sub_title: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Node graph.
    pub graph: TemplateGraph,
    /// Unsaved changes exist.
    pub need_save: bool,
    /// A save request is in flight.
    pub on_save: bool,
}

impl TemplateDraft {
    /// Empty draft.
    #[must_use]
    pub fn new(key: TemplateKey) -> Self {
        Self {
            key,
            sub_title: None,
            description: None,
            graph: TemplateGraph::default(),
            need_save: false,
            on_save: false,
        }
    }

    /// Draft seeded from a server template record.
    pub fn from_record(key: TemplateKey, record: &Value) -> Result<Self, serde_json::Error> {
        let graph = match record.get("template") {
            Some(graph) if !graph.is_null() => TemplateGraph::deserialize(graph)?,
            _ => TemplateGraph::default(),
        };
        let string_field =
            |name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(Self {
            sub_title: string_field("sub_title"),
            description: string_field("description"),
            graph,
            ..Self::new(key)
        })
    }

    /// Add an input, output or param slot. Returns its id.
    ///
    /// [`NodeGroup::Dags`] is not a slot group and yields `None`.
    pub fn add_slot(&mut self, group: NodeGroup, position: Position) -> Option<String> {
        let fields = group.slot_defaults()?;
        let id = format!("{group}_{}", short_id());
        self.graph.group_mut(group).push(TemplateNode {
            id: id.clone(),
            position,
            fields,
            ..TemplateNode::default()
        });
        self.need_save = true;
        Some(id)
    }

    /// Add a dag node using the catalog entry's parameter defaults.
    pub fn add_dag(&mut self, name: &str, position: Position, catalog_entry: Option<&Value>) -> String {
        let params = catalog_entry
            .and_then(|entry| entry.get("params"))
            .and_then(Value::as_array)
            .map(|defs| {
                defs.iter()
                    .filter_map(|def| {
                        let name = def.get("name")?.as_str()?;
                        Some((
                            name.to_string(),
                            def.get("default").cloned().unwrap_or(Value::Null),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let id = short_id();
        let mut fields = Map::new();
        let _ = fields.insert("name".to_string(), Value::String(name.to_string()));
        self.graph.dags.push(TemplateNode {
            id: id.clone(),
            position,
            params,
            fields,
            ..TemplateNode::default()
        });
        self.need_save = true;
        id
    }

    /// Remove node `id` and every link pointing at it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let nodes = self.graph.group_mut(NodeGroup::of_node(id));
        let before = nodes.len();
        nodes.retain(|n| n.id != id);
        if nodes.len() == before {
            return false;
        }
        for group in NodeGroup::ALL {
            for node in self.graph.group_mut(group) {
                node.drop_links_to(id);
            }
        }
        self.need_save = true;
        true
    }

    /// Move node `id`.
    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        let Some(node) = self.graph.node_mut(NodeGroup::of_node(id), id) else {
            return false;
        };
        node.position = position;
        self.need_save = true;
        true
    }

    /// Set one field of node `id` in `group`.
    pub fn set_field(&mut self, group: NodeGroup, id: &str, key: &str, value: Value) -> bool {
        let Some(node) = self.graph.node_mut(group, id) else {
            return false;
        };
        let changed = node.set_field(key, value);
        self.need_save |= changed;
        changed
    }

    /// Apply a parameter form to node `id` in `group`.
    ///
    /// On slot groups a `_`-prefixed key sets the node field of that name;
    /// every other key sets a parameter value.
    pub fn set_params(&mut self, group: NodeGroup, id: &str, params: &Map<String, Value>) -> bool {
        let Some(node) = self.graph.node_mut(group, id) else {
            return false;
        };
        for (key, value) in params {
            match key.strip_prefix('_') {
                Some(field) if group.is_slot() => {
                    let _ = node.set_field(field, value.clone());
                }
                _ => {
                    let _ = node.params.insert(key.clone(), value.clone());
                }
            }
        }
        self.need_save = true;
        true
    }

    /// Add a link from `from_id`'s `from_port`.
    pub fn connect(&mut self, from_id: &str, from_port: &str, link: Link) -> bool {
        let Some(node) = self.graph.node_mut(NodeGroup::of_node(from_id), from_id) else {
            return false;
        };
        node.outputs.entry(from_port.to_string()).or_default().push(link);
        self.need_save = true;
        true
    }

    /// Remove every link from `source`'s `port` to `target`.
    pub fn disconnect(&mut self, source: &str, port: &str, target: &str) -> bool {
        let Some(node) = self.graph.node_mut(NodeGroup::of_node(source), source) else {
            return false;
        };
        let Some(links) = node.outputs.get_mut(port) else {
            return false;
        };
        let before = links.len();
        links.retain(|l| l.to_id != target);
        if links.len() == before {
            return false;
        }
        self.need_save = true;
        true
    }

    /// Body of `POST /api/templates/save`.
    #[must_use]
    pub fn save_payload(&self) -> Value {
        let mut body = Map::new();
        let _ = body.insert("name".into(), Value::String(self.key.name.clone()));
        let _ = body.insert("version".into(), Value::String(self.key.version.clone()));
        if let Some(sub_title) = self.sub_title.as_ref().filter(|s| !s.is_empty()) {
            let _ = body.insert("sub_title".into(), Value::String(sub_title.clone()));
        }
        if let Some(description) = self.description.as_ref().filter(|s| !s.is_empty()) {
            let _ = body.insert("description".into(), Value::String(description.clone()));
        }
        if !self.graph.is_empty() {
            if let Ok(graph) = serde_json::to_value(&self.graph) {
                let _ = body.insert("template".into(), graph);
            }
        }
        Value::Object(body)
    }
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(9);
    id
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TemplateDraft {
        TemplateDraft::new(TemplateKey::new("pump", "1"))
    }

    #[test]
    fn group_from_node_id() {
        assert_eq!(NodeGroup::of_node("input_abc"), NodeGroup::Input);
        assert_eq!(NodeGroup::of_node("output_abc"), NodeGroup::Output);
        assert_eq!(NodeGroup::of_node("param_abc"), NodeGroup::Param);
        assert_eq!(NodeGroup::of_node("a1b2c3d4e"), NodeGroup::Dags);
        assert_eq!(NodeGroup::of_node("inputs_x"), NodeGroup::Dags);
    }

    #[test]
    fn link_serializes_as_triple() {
        let link = Link::new("in", "abc", "value");
        assert_eq!(serde_json::to_value(&link).unwrap(), json!(["in", "abc", "value"]));
        let parsed: Link = serde_json::from_value(json!(["in", 12, "v"])).unwrap();
        assert_eq!(parsed, Link::new("in", "12", "v"));
        assert!(serde_json::from_value::<Link>(json!(["in", "x"])).is_err());
    }

    #[test]
    fn add_slot_uses_defaults() {
        let mut d = draft();
        let id = d.add_slot(NodeGroup::Param, Position::new(10.7, 20.2)).unwrap();
        assert!(id.starts_with("param_"));
        assert_eq!(id.len(), "param_".len() + 9);
        let node = d.graph.node(NodeGroup::Param, &id).unwrap();
        assert_eq!(node.position, Position { x: 10.0, y: 20.0 });
        assert_eq!(node.fields["name"], "params");
        assert_eq!(node.fields["public"], true);
        assert!(d.need_save);
        assert!(d.add_slot(NodeGroup::Dags, Position::default()).is_none());
    }

    #[test]
    fn add_dag_takes_catalog_defaults() {
        let mut d = draft();
        let entry = json!({"name": "pid", "params": [
            {"name": "kp", "default": 1.5},
            {"name": "ki"},
            {"default": 3}
        ]});
        let id = d.add_dag("pid", Position::new(0.0, 0.0), Some(&entry));
        let node = d.graph.node(NodeGroup::Dags, &id).unwrap();
        assert_eq!(node.fields["name"], "pid");
        assert_eq!(Value::Object(node.params.clone()), json!({"kp": 1.5, "ki": null}));
        assert_eq!(NodeGroup::of_node(&id), NodeGroup::Dags);
    }

    #[test]
    fn remove_node_clears_incoming_links() {
        let mut d = draft();
        let input = d.add_slot(NodeGroup::Input, Position::default()).unwrap();
        let param = d.add_slot(NodeGroup::Param, Position::default()).unwrap();
        let dag = d.add_dag("pid", Position::default(), None);
        let other = d.add_dag("log", Position::default(), None);
        assert!(d.connect(&input, "default", Link::new("in", &dag, "value")));
        assert!(d.connect(&param, "params", Link::new("params", &dag, "kp")));
        assert!(d.connect(&other, "out", Link::new("in", &dag, "value")));
        assert!(d.connect(&other, "out", Link::new("in", &input, "x")));

        assert!(d.remove_node(&dag));
        assert!(d.graph.node(NodeGroup::Dags, &dag).is_none());
        assert!(d.graph.node(NodeGroup::Input, &input).unwrap().outputs["default"].is_empty());
        assert!(d.graph.node(NodeGroup::Param, &param).unwrap().outputs["params"].is_empty());
        assert_eq!(
            d.graph.node(NodeGroup::Dags, &other).unwrap().outputs["out"],
            vec![Link::new("in", &input, "x")]
        );
        assert!(!d.remove_node(&dag));
    }

    #[test]
    fn set_params_routes_underscore_keys_to_fields() {
        let mut d = draft();
        let input = d.add_slot(NodeGroup::Input, Position::default()).unwrap();
        let dag = d.add_dag("pid", Position::default(), None);
        let form = json!({"_name": "temperature", "_description": "Sensor", "unit": "C"});
        let form = form.as_object().unwrap();

        assert!(d.set_params(NodeGroup::Input, &input, form));
        let node = d.graph.node(NodeGroup::Input, &input).unwrap();
        assert_eq!(node.fields["name"], "temperature");
        assert_eq!(node.fields["description"], "Sensor");
        assert_eq!(node.params["unit"], "C");

        assert!(d.set_params(NodeGroup::Dags, &dag, form));
        let node = d.graph.node(NodeGroup::Dags, &dag).unwrap();
        assert_eq!(node.params["_name"], "temperature");
        assert_eq!(node.fields["name"], "pid");

        assert!(!d.set_params(NodeGroup::Dags, "missing", form));
    }

    #[test]
    fn set_field_rejects_identity_changes() {
        let mut d = draft();
        let id = d.add_slot(NodeGroup::Output, Position::default()).unwrap();
        d.need_save = false;
        assert!(!d.set_field(NodeGroup::Output, &id, "id", json!("x")));
        assert!(!d.need_save);
        assert!(d.set_field(NodeGroup::Output, &id, "position", json!([3.9, 4.1])));
        assert_eq!(
            d.graph.node(NodeGroup::Output, &id).unwrap().position,
            Position { x: 3.0, y: 4.0 }
        );
        assert!(d.need_save);
    }

    #[test]
    fn disconnect_removes_matching_target() {
        let mut d = draft();
        let a = d.add_dag("a", Position::default(), None);
        assert!(d.connect(&a, "out", Link::new("in", "b", "v")));
        assert!(d.connect(&a, "out", Link::new("in", "c", "v")));
        assert!(d.disconnect(&a, "out", "b"));
        assert_eq!(
            d.graph.node(NodeGroup::Dags, &a).unwrap().outputs["out"],
            vec![Link::new("in", "c", "v")]
        );
        assert!(!d.disconnect(&a, "missing", "c"));
    }

    #[test]
    fn disconnect_without_matching_link_keeps_draft_clean() {
        let mut d = draft();
        let a = d.add_dag("a", Position::default(), None);
        assert!(d.connect(&a, "out", Link::new("in", "c", "v")));
        d.need_save = false;

        assert!(!d.disconnect(&a, "out", "b"));
        assert!(!d.need_save);
        assert_eq!(d.graph.node(NodeGroup::Dags, &a).unwrap().outputs["out"].len(), 1);
    }

    #[test]
    fn from_record_and_save_payload() {
        let record = json!({
            "name": "pump",
            "version": "1",
            "description": "Pump control",
            "template": {
                "input": [{"id": "input_x", "position": [1, 2], "name": "level", "group": "input"}],
                "dags": [{"id": "d1", "position": [5, 6], "name": "pid",
                          "outputs": {"out": [["in", "input_x", "v"]]}}]
            }
        });
        let d = TemplateDraft::from_record(TemplateKey::new("pump", "1"), &record).unwrap();
        assert_eq!(d.graph.len(), 2);
        assert!(!d.need_save);
        assert_eq!(d.description.as_deref(), Some("Pump control"));

        let payload = d.save_payload();
        assert_eq!(payload["name"], "pump");
        assert_eq!(payload["version"], "1");
        assert!(payload.get("sub_title").is_none());
        assert_eq!(payload["template"]["input"][0]["name"], "level");
        assert_eq!(payload["template"]["input"][0]["position"], json!([1.0, 2.0]));
        assert_eq!(payload["template"]["dags"][0]["outputs"]["out"][0], json!(["in", "input_x", "v"]));
    }

    #[test]
    fn empty_draft_payload_has_no_template() {
        let payload = draft().save_payload();
        assert_eq!(payload, json!({"name": "pump", "version": "1"}));
    }
}
