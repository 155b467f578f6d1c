//! The questionnaire schema's data model: sections, questions, actions,
//! edges, and variable definitions.
//!
//! These are plain data types deserialized from the `GraphNode`/edge
//! records a `GraphStore` returns; nothing here talks to the store itself
//! (see [`crate::graph_store`] and [`crate::queries`]).

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::value::TemplateValue;

/// One half of a variable's expression body, selected either by which of
/// `cypher`/`python` is populated, or by an explicit `cypher:`/`python:`
/// prefix on whichever one is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprBody {
    Cypher(String),
    Python(String),
}

impl ExprBody {
    /// Parse a bare expression string that must carry an explicit
    /// `cypher:`/`python:` prefix — used for `askWhen` predicates and
    /// `sourceNode` expressions, which (unlike [`VariableDef`]) have no
    /// separate `cypher`/`python` fields to disambiguate on.
    pub fn parse_prefixed(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix("cypher:") {
            Ok(ExprBody::Cypher(rest.trim_start().to_string()))
        } else if let Some(rest) = trimmed.strip_prefix("python:") {
            Ok(ExprBody::Python(rest.trim_start().to_string()))
        } else {
            Err(ModelError::AmbiguousExpression(raw.to_string()))
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ExprBody::Cypher(s) | ExprBody::Python(s) => s,
        }
    }
}

/// A named, lazily-evaluated expression attached to a section, edge, or
/// action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cypher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

impl VariableDef {
    pub const DEFAULT_TIMEOUT_MS: u64 = 500;

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(Self::DEFAULT_TIMEOUT_MS)
    }

    /// Resolve which evaluator this definition selects: exactly one of
    /// `cypher`/`python` must be set, with an inline prefix on that field
    /// allowed to override the evaluator (e.g. a `python` field whose text
    /// actually begins with `cypher:`).
    pub fn resolved_body(&self) -> Result<ExprBody, ModelError> {
        match (&self.cypher, &self.python) {
            (Some(c), None) => Ok(inline_override(c).unwrap_or_else(|| ExprBody::Cypher(c.clone()))),
            (None, Some(p)) => Ok(inline_override(p).unwrap_or_else(|| ExprBody::Python(p.clone()))),
            (Some(_), Some(_)) => Err(ModelError::AmbiguousExpression(format!(
                "variable '{}' declares both cypher and python bodies",
                self.name
            ))),
            (None, None) => Err(ModelError::AmbiguousExpression(format!(
                "variable '{}' declares neither cypher nor python body",
                self.name
            ))),
        }
    }
}

fn inline_override(raw: &str) -> Option<ExprBody> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("cypher:") {
        Some(ExprBody::Cypher(rest.trim_start().to_string()))
    } else {
        trimmed
            .strip_prefix("python:")
            .map(|rest| ExprBody::Python(rest.trim_start().to_string()))
    }
}

/// A `Section` node: the unit a traversal is invoked against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "sectionId")]
    pub section_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "inputParams")]
    pub input_params: Vec<String>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
}

/// A `Question` node: the engine's "next step" when unanswered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "questionId")]
    pub question_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, rename = "fieldId")]
    pub field_id: String,
    #[serde(default, rename = "dataType")]
    pub data_type: String,
    #[serde(default, rename = "orderInForm")]
    pub order_in_form: i64,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
}

impl Question {
    pub fn to_template_value(&self) -> TemplateValue {
        TemplateValue::from(&serde_json::to_value(self).unwrap_or(serde_json::Value::Null))
    }
}

/// What kind of side effect an [`Action`] performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType")]
pub enum ActionKind {
    CreatePropertyNode {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        returns: Option<serde_json::Value>,
    },
    GotoSection {
        #[serde(default, rename = "nextSectionId", skip_serializing_if = "Option::is_none")]
        next_section_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<String>,
    },
    MarkSectionComplete {
        body: String,
    },
}

/// An `Action` node: a side-effecting vertex traversed via `TRIGGERS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "actionId")]
    pub action_id: String,
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default = "default_true", rename = "returnImmediately")]
    pub return_immediately: bool,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default, rename = "sourceNode", skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
}

fn default_true() -> bool {
    true
}

/// The kind of edge connecting a structural node to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "PRECEDES")]
    Precedes,
    #[serde(rename = "TRIGGERS")]
    Triggers,
}

/// One outgoing edge from a traversed node, as reported by the graph
/// store: already resolved to an existing latest-active target id plus
/// whatever gating/variable/source metadata is attached to the edge
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub kind: EdgeKind,
    /// The id of the node this edge points at — resolved to its
    /// latest-active version by the traversal engine before dispatch.
    pub to: String,
    #[serde(rename = "orderInForm")]
    pub order_in_form: i64,
    #[serde(default, rename = "askWhen", skip_serializing_if = "Option::is_none")]
    pub ask_when: Option<String>,
    #[serde(default, rename = "sourceNode", skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    /// Opaque, store-assigned tiebreak token for edges sharing the same
    /// `orderInForm` — "creation order as reported by the GraphStore".
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// The logical kind of a resolved node, taken from its first label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Section,
    Question,
    Action,
    Datapoint,
    Anchor,
}

impl NodeKind {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Section" => NodeKind::Section,
            "Question" => NodeKind::Question,
            "Action" => NodeKind::Action,
            "Datapoint" => NodeKind::Datapoint,
            _ => NodeKind::Anchor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_def_selects_cypher_by_field() {
        let def = VariableDef {
            name: "x".into(),
            cypher: Some("MATCH (n) RETURN n".into()),
            python: None,
            timeout_ms: None,
        };
        assert_eq!(
            def.resolved_body().unwrap(),
            ExprBody::Cypher("MATCH (n) RETURN n".into())
        );
        assert_eq!(def.timeout_ms(), VariableDef::DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn variable_def_inline_prefix_overrides_field() {
        let def = VariableDef {
            name: "x".into(),
            cypher: Some("python: len(sourceNode) > 0".into()),
            python: None,
            timeout_ms: Some(250),
        };
        assert_eq!(
            def.resolved_body().unwrap(),
            ExprBody::Python("len(sourceNode) > 0".into())
        );
        assert_eq!(def.timeout_ms(), 250);
    }

    #[test]
    fn variable_def_rejects_both_or_neither() {
        let neither = VariableDef {
            name: "x".into(),
            cypher: None,
            python: None,
            timeout_ms: None,
        };
        assert!(neither.resolved_body().is_err());

        let both = VariableDef {
            name: "x".into(),
            cypher: Some("RETURN 1".into()),
            python: Some("1".into()),
            timeout_ms: None,
        };
        assert!(both.resolved_body().is_err());
    }

    #[test]
    fn ask_when_requires_explicit_prefix() {
        assert!(ExprBody::parse_prefixed("{{ flag }} == true").is_err());
        assert_eq!(
            ExprBody::parse_prefixed("python: {{ flag }} == true").unwrap(),
            ExprBody::Python("{{ flag }} == true".into())
        );
    }
}
