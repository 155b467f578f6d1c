//! The `GraphStore` abstract collaborator (component C1).
//!
//! The engine never speaks to a database driver directly; it issues
//! [`CypherStatement`]s through this trait and reads back rows as
//! [`TemplateValue`]s. Two implementations live in `questionnaire-graphstore`:
//! an in-memory reference store for tests, and an optional Neo4j-backed one.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::EvalOutcome;
use crate::value::TemplateValue;

/// A Cypher query plus its bound parameters.
///
/// Two flavors travel through the same type: a small, fixed set of
/// engine-authored *canonical* statements (see [`crate::queries`]) used to
/// resolve structure, and arbitrary schema-authored ad hoc bodies (variable
/// `cypher:` expressions, `askWhen` predicates, `sourceNode` expressions).
/// The `GraphStore` implementation does not need to tell these apart by
/// anything other than the statement text itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherStatement {
    pub template: String,
    pub params: Vec<(String, TemplateValue)>,
}

impl CypherStatement {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: TemplateValue) -> Self {
        self.params.push((name.into(), value));
        self
    }
}

/// One row returned by a query, addressed by the column names the query
/// itself declares in its `RETURN` clause.
pub type Record = indexmap::IndexMap<String, TemplateValue>;

/// The result of a successful [`GraphStore::run_query`] call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutcome {
    pub records: Vec<Record>,
    /// `true` if the store stopped collecting rows at `row_cap` before
    /// exhausting the result set.
    pub truncated: bool,
}

impl QueryOutcome {
    pub fn single(record: Record) -> Self {
        Self {
            records: vec![record],
            truncated: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Abstract collaborator C1: runs a Cypher statement against whatever graph
/// backend is configured and returns bounded, typed rows.
///
/// Implementations must honor `timeout` and `row_cap` themselves; the
/// traversal engine treats both as hard limits it never has to re-enforce.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run_query(
        &self,
        statement: &CypherStatement,
        timeout: Duration,
        row_cap: usize,
    ) -> EvalOutcome<QueryOutcome>;
}
