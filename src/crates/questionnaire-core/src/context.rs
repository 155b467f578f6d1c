//! Per-request state threaded through a single traversal.
//!
//! A `Context` is created fresh for every `Session::handle` call and
//! discarded afterwards; nothing here is persisted. `inputs` and the
//! variable resolver's cache are deliberately kept as two separate maps (see
//! [`crate::variables::VariableResolver`]) so that a user-defined variable
//! can shadow an input parameter by name without ever mutating the
//! read-only input itself.

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::Warning;
use crate::value::TemplateValue;

/// The two reserved root names a template path may resolve to without
/// going through the variable cache or the input map.
pub const RESERVED_SOURCE_NODE: &str = "sourceNode";
pub const RESERVED_CREATED_NODE_IDS: &str = "createdNodeIds";

#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Input parameters supplied on the request, read-only for the
    /// lifetime of the traversal.
    pub inputs: IndexMap<String, TemplateValue>,
    /// The node currently designated as the traversal's data source;
    /// replaced wholesale by `sourceNode` expressions on edges/actions.
    pub source_node: TemplateValue,
    /// Ids contributed by `CreatePropertyNode` actions, append-only. Kept
    /// as `TemplateValue` rather than a narrower type since a `createdId`
    /// column is whatever scalar the GraphStore returns for it (normally
    /// an integer).
    pub created_node_ids: Vec<TemplateValue>,
    pub completed: bool,
    /// Set by a `GotoSection` action; once set, never cleared by further
    /// traversal (see the action-execution design notes).
    pub next_section_id: Option<String>,
    pub warnings: Vec<Warning>,
    /// Host-supplied cancellation signal, checked at the top of each edge-
    /// selection loop iteration (the traversal's suspension boundary).
    /// `None` when the host gave none, in which case cancellation is never
    /// checked.
    pub cancellation: Option<CancellationToken>,
}

impl Context {
    pub fn new(inputs: IndexMap<String, TemplateValue>) -> Self {
        Self {
            inputs,
            ..Default::default()
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn push_created_node_id(&mut self, id: TemplateValue) {
        self.created_node_ids.push(id);
    }

    pub fn warn(&mut self, variable: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Warning::new(variable, message));
    }

    /// Resolve one of the two reserved template root names.
    pub fn lookup_reserved(&self, name: &str) -> Option<TemplateValue> {
        match name {
            RESERVED_SOURCE_NODE => Some(self.source_node.clone()),
            RESERVED_CREATED_NODE_IDS => Some(TemplateValue::List(self.created_node_ids.clone())),
            _ => None,
        }
    }
}
