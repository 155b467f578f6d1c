//! The tagged value variant that flows between the graph store, the
//! template renderer, the sandboxed scripts, and the final response.
//!
//! Per the Design Notes, rendered values are never exposed as host-language
//! objects. Every value that crosses a component boundary — a database row
//! cell, a rendered template placeholder, a sandboxed script's return value,
//! a response field — is a [`TemplateValue`]. This lets the renderer walk a
//! path against a value tree instead of invoking language-level attribute
//! access, and lets [`GraphNode`] round-trip through JSON without leaking
//! whatever type a particular `GraphStore` backend happens to use natively.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A node returned by the graph store: a labelled, identified bag of
/// properties.
///
/// `{{ node.foo }}` resolves to `node.properties.foo` — the `properties`
/// indirection is collapsed away by [`TemplateValue::get_path`] so template
/// authors never need to know about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: IndexMap<String, TemplateValue>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            labels: Vec::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: TemplateValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The primary kind (`Section`/`Question`/`Action`/`Datapoint`/anchor
    /// label) — the first label, by graph-store convention.
    pub fn kind(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

/// A JSON-shaped value with an explicit `Node` tag for graph-store rows.
///
/// This is the only value type the engine ever passes across a component
/// boundary: `GraphStore` rows, `ScriptSandbox` contexts and return values,
/// rendered template literals, and response payload fields are all
/// `TemplateValue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    // `Node` is tried before `Map` so that objects carrying the required
    // `id`/`labels`/`properties` shape deserialize as a node; any other
    // object falls through to the generic `Map` arm.
    Node(GraphNode),
    List(Vec<TemplateValue>),
    Map(IndexMap<String, TemplateValue>),
}

impl Default for TemplateValue {
    fn default() -> Self {
        TemplateValue::Null
    }
}

impl From<&Json> for TemplateValue {
    fn from(value: &Json) -> Self {
        match value {
            Json::Null => TemplateValue::Null,
            Json::Bool(b) => TemplateValue::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    TemplateValue::Int(i)
                } else {
                    TemplateValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Json::String(s) => TemplateValue::String(s.clone()),
            Json::Array(items) => TemplateValue::List(items.iter().map(TemplateValue::from).collect()),
            Json::Object(map) => TemplateValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Json> for TemplateValue {
    fn from(value: Json) -> Self {
        TemplateValue::from(&value)
    }
}

impl TemplateValue {
    /// Convert to the equivalent `serde_json::Value`, collapsing the `Node`
    /// tag into a plain `{ id, labels, properties }` object.
    pub fn to_json(&self) -> Json {
        match self {
            TemplateValue::Null => Json::Null,
            TemplateValue::Bool(b) => Json::Bool(*b),
            TemplateValue::Int(i) => Json::Number((*i).into()),
            TemplateValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            TemplateValue::String(s) => Json::String(s.clone()),
            TemplateValue::List(items) => Json::Array(items.iter().map(TemplateValue::to_json).collect()),
            TemplateValue::Map(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            TemplateValue::Node(node) => serde_json::json!({
                "id": node.id,
                "labels": node.labels,
                "properties": node.properties.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
            }),
        }
    }

    /// Render as the literal text substituted into a template placeholder.
    pub fn to_json_literal(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_else(|_| "null".to_string())
    }

    /// Render as a literal in the dialect the placeholder is being
    /// substituted into. `cypher:` bodies and plain action-body text are
    /// JSON-shaped and can take [`Self::to_json_literal`] directly, but a
    /// `python:` (rhai) body needs its own literal grammar: rhai has no
    /// `null` (it's the unit value `()`), and object literals are written
    /// `#{ ... }`, not `{ ... }` (a bare `{` opens a statement block, which
    /// rhai's expression-only evaluation rejects). Bool/int/float/string
    /// values are valid in both dialects, but lists and maps must recurse
    /// per-element since a nested value can itself be null or a map.
    pub fn to_literal(&self, dialect: TemplateDialect) -> String {
        match dialect {
            TemplateDialect::Json => self.to_json_literal(),
            TemplateDialect::Rhai => self.to_rhai_literal(),
        }
    }

    fn to_rhai_literal(&self) -> String {
        match self {
            TemplateValue::Null => "()".to_string(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Int(i) => i.to_string(),
            TemplateValue::Float(f) => {
                let rendered = f.to_string();
                if rendered.contains(['.', 'e', 'E']) {
                    rendered
                } else {
                    format!("{rendered}.0")
                }
            }
            TemplateValue::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
            TemplateValue::List(items) => {
                let parts: Vec<String> = items.iter().map(TemplateValue::to_rhai_literal).collect();
                format!("[{}]", parts.join(", "))
            }
            TemplateValue::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", serde_json::to_string(k).unwrap_or_else(|_| "\"\"".to_string()), v.to_rhai_literal()))
                    .collect();
                format!("#{{{}}}", parts.join(", "))
            }
            TemplateValue::Node(node) => {
                let collapsed = serde_json::json!({
                    "id": node.id,
                    "labels": node.labels,
                    "properties": node.properties.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
                });
                TemplateValue::from(&collapsed).to_rhai_literal()
            }
        }
    }

    /// Parse a string as JSON, returning `None` if it doesn't parse — used
    /// by the variable resolver to normalize evaluator string returns that
    /// happen to be JSON-encoded.
    pub fn try_parse_json(raw: &str) -> Option<TemplateValue> {
        serde_json::from_str::<Json>(raw).ok().map(TemplateValue::from)
    }

    /// Resolve a dotted/bracketed path against this value, e.g.
    /// `b[0].c` against the value bound to `a` in `a.b[0].c`.
    pub fn get_path(&self, segments: &[PathSegment]) -> Option<&TemplateValue> {
        let mut current = self;
        for segment in segments {
            current = match (current, segment) {
                (TemplateValue::Map(map), PathSegment::Key(key)) => map.get(key)?,
                (TemplateValue::Node(node), PathSegment::Key(key)) => node.properties.get(key)?,
                (TemplateValue::List(items), PathSegment::Index(idx)) => items.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Truthiness used outside the sandbox — for `cypher:`-evaluated
    /// ad hoc expressions returned as plain values (not predicates gated
    /// by row count), and for rendering debug output. `askWhen` truthiness
    /// for `python:` expressions is defined by the sandbox itself; see
    /// `questionnaire-rhai-sandbox` for that mapping.
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::Bool(b) => *b,
            TemplateValue::Int(i) => *i != 0,
            TemplateValue::Float(f) => *f != 0.0,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(map) => !map.is_empty(),
            TemplateValue::Node(_) => true,
        }
    }
}

/// A single segment of a parsed template path: `a.b[0].c` becomes
/// `[Key("a"), Key("b"), Index(0), Key("c")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Which literal grammar a rendered template placeholder must produce,
/// chosen by the destination the rendered text is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateDialect {
    /// `cypher:` statement bodies and plain action-body text: JSON literals.
    Json,
    /// `python:` (rhai) expression bodies.
    Rhai,
}
