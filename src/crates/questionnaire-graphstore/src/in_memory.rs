//! A real, in-memory `GraphStore`: authentic graph semantics for the three
//! canonical structural statements, plus a programmable fixture registry
//! for ad hoc statement text.
//!
//! This is the store the core's integration tests and worked scenarios run
//! against: a genuine simple backend rather than a mock object. Like the
//! `Neo4jGraphStore` adapter in this crate, it does not attempt full Cypher
//! parsing: ad hoc statements are served from a fixture registry keyed by
//! exact rendered text, returning `UnregisteredStatement` for anything not
//! seeded.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use questionnaire_core::error::EvalOutcome;
use questionnaire_core::graph_store::{CypherStatement, GraphStore, QueryOutcome, Record};
use questionnaire_core::model::{EdgeKind, VariableDef};
use questionnaire_core::queries;
use questionnaire_core::value::TemplateValue;

use crate::error::GraphStoreError;

#[derive(Debug, Clone)]
pub struct NodeVersion {
    pub version_number: i64,
    pub active: bool,
    pub labels: Vec<String>,
    pub properties: IndexMap<String, TemplateValue>,
}

#[derive(Debug, Clone)]
pub struct EdgeFixture {
    pub kind: EdgeKind,
    pub to: String,
    pub order_in_form: i64,
    pub ask_when: Option<String>,
    pub source_node: Option<String>,
    pub variables: Vec<VariableDef>,
    pub created_at: i64,
}

impl EdgeFixture {
    pub fn precedes(to: impl Into<String>, order_in_form: i64, created_at: i64) -> Self {
        Self {
            kind: EdgeKind::Precedes,
            to: to.into(),
            order_in_form,
            ask_when: None,
            source_node: None,
            variables: Vec::new(),
            created_at,
        }
    }

    pub fn triggers(to: impl Into<String>, order_in_form: i64, created_at: i64) -> Self {
        Self {
            kind: EdgeKind::Triggers,
            ..Self::precedes(to, order_in_form, created_at)
        }
    }

    pub fn with_ask_when(mut self, expr: impl Into<String>) -> Self {
        self.ask_when = Some(expr.into());
        self
    }

    pub fn with_source_node(mut self, expr: impl Into<String>) -> Self {
        self.source_node = Some(expr.into());
        self
    }
}

#[derive(Default)]
struct InnerState {
    nodes: HashMap<String, Vec<NodeVersion>>,
    edges: HashMap<String, Vec<EdgeFixture>>,
    datapoints: Vec<(String, String)>,
    fixtures: HashMap<String, EvalOutcome<QueryOutcome>>,
}

/// A simple in-memory graph: nodes keyed by their external stable id
/// (`sectionId`/`questionId`/`actionId`), each with one or more versions;
/// a `PRECEDES`/`TRIGGERS` edge list keyed by source id; and a flat list
/// of answered `(questionId, sourceNodeId)` pairs standing in for
/// `Datapoint`/`SUPPLIES`/`ANSWERS` relationships.
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<InnerState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_version(
        &self,
        id: impl Into<String>,
        labels: Vec<String>,
        version_number: i64,
        active: bool,
        properties: IndexMap<String, TemplateValue>,
    ) {
        self.state.write().nodes.entry(id.into()).or_default().push(NodeVersion {
            version_number,
            active,
            labels,
            properties,
        });
    }

    /// Convenience for the common case: a single active version.
    pub fn add_node(&self, id: impl Into<String>, labels: Vec<String>, properties: IndexMap<String, TemplateValue>) {
        self.add_node_version(id, labels, 1, true, properties);
    }

    pub fn add_edge(&self, from: impl Into<String>, edge: EdgeFixture) {
        self.state.write().edges.entry(from.into()).or_default().push(edge);
    }

    pub fn mark_answered(&self, question_id: impl Into<String>, source_node_id: impl Into<String>) {
        self.state.write().datapoints.push((question_id.into(), source_node_id.into()));
    }

    /// Register the canned result for an ad hoc statement, matched by the
    /// exact rendered statement text the engine will issue.
    pub fn seed_query_result(&self, rendered_statement: impl Into<String>, outcome: QueryOutcome) {
        self.state
            .write()
            .fixtures
            .insert(rendered_statement.into(), EvalOutcome::Ok(outcome));
    }

    /// Register a canned failure for an ad hoc statement (useful for
    /// exercising timeout/error recovery paths in tests).
    pub fn seed_query_failure(&self, rendered_statement: impl Into<String>, outcome: EvalOutcome<QueryOutcome>) {
        self.state.write().fixtures.insert(rendered_statement.into(), outcome);
    }

    fn latest_active_node(&self, statement: &CypherStatement, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        let Some(id) = string_param(statement, "id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("id".into()).to_string());
        };
        let state = self.state.read();
        let Some(versions) = state.nodes.get(id) else {
            return EvalOutcome::Ok(QueryOutcome::empty());
        };
        let latest = versions.iter().filter(|v| v.active).max_by_key(|v| v.version_number);
        match latest {
            None => EvalOutcome::Ok(QueryOutcome::empty()),
            Some(version) => {
                let mut record: Record = IndexMap::new();
                record.insert("id".to_string(), TemplateValue::String(id.clone()));
                record.insert(
                    "labels".to_string(),
                    TemplateValue::List(version.labels.iter().cloned().map(TemplateValue::String).collect()),
                );
                record.insert("properties".to_string(), TemplateValue::Map(version.properties.clone()));
                record.insert("versionNumber".to_string(), TemplateValue::Int(version.version_number));
                let outcome = truncate(vec![record], row_cap);
                EvalOutcome::Ok(outcome)
            }
        }
    }

    fn outgoing_edges(&self, statement: &CypherStatement, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        let Some(id) = string_param(statement, "id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("id".into()).to_string());
        };
        let state = self.state.read();
        let mut edges: Vec<&EdgeFixture> = state.edges.get(id).map(|v| v.iter().collect()).unwrap_or_default();
        edges.sort_by(|a, b| a.order_in_form.cmp(&b.order_in_form).then(a.created_at.cmp(&b.created_at)));

        let records = edges
            .into_iter()
            .map(|edge| {
                let mut record: Record = IndexMap::new();
                let kind_json = serde_json::to_value(edge.kind).unwrap_or(serde_json::Value::Null);
                record.insert("kind".to_string(), TemplateValue::from(&kind_json));
                record.insert("to".to_string(), TemplateValue::String(edge.to.clone()));
                record.insert("orderInForm".to_string(), TemplateValue::Int(edge.order_in_form));
                record.insert(
                    "askWhen".to_string(),
                    edge.ask_when.clone().map(TemplateValue::String).unwrap_or(TemplateValue::Null),
                );
                record.insert(
                    "sourceNode".to_string(),
                    edge.source_node.clone().map(TemplateValue::String).unwrap_or(TemplateValue::Null),
                );
                let vars_json = serde_json::to_value(&edge.variables).unwrap_or(serde_json::Value::Null);
                record.insert("variables".to_string(), TemplateValue::from(&vars_json));
                record.insert("createdAt".to_string(), TemplateValue::Int(edge.created_at));
                record
            })
            .collect();
        EvalOutcome::Ok(truncate(records, row_cap))
    }

    fn answered_check(&self, statement: &CypherStatement) -> EvalOutcome<QueryOutcome> {
        let Some(question_id) = string_param(statement, "question_id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("question_id".into()).to_string());
        };
        let source_node_id = match param(statement, "source_node_id") {
            Some(TemplateValue::String(s)) => s.clone(),
            _ => return EvalOutcome::Ok(QueryOutcome::empty()),
        };
        let state = self.state.read();
        let answered = state
            .datapoints
            .iter()
            .any(|(q, s)| q == question_id && s == &source_node_id);
        if answered {
            let mut record: Record = IndexMap::new();
            record.insert("answered".to_string(), TemplateValue::Bool(true));
            EvalOutcome::Ok(QueryOutcome::single(record))
        } else {
            EvalOutcome::Ok(QueryOutcome::empty())
        }
    }

    fn lookup_fixture(&self, statement_text: &str) -> EvalOutcome<QueryOutcome> {
        self.state
            .read()
            .fixtures
            .get(statement_text)
            .cloned()
            .unwrap_or_else(|| EvalOutcome::Err(GraphStoreError::UnregisteredStatement(statement_text.to_string()).to_string()))
    }
}

fn param<'a>(statement: &'a CypherStatement, name: &str) -> Option<&'a TemplateValue> {
    statement.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

fn string_param<'a>(statement: &'a CypherStatement, name: &str) -> Option<&'a String> {
    match param(statement, name) {
        Some(TemplateValue::String(s)) => Some(s),
        _ => None,
    }
}

fn truncate(mut records: Vec<Record>, row_cap: usize) -> QueryOutcome {
    let truncated = records.len() > row_cap;
    records.truncate(row_cap);
    QueryOutcome { records, truncated }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn run_query(&self, statement: &CypherStatement, _timeout: Duration, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        match statement.template.as_str() {
            queries::LATEST_ACTIVE_NODE => self.latest_active_node(statement, row_cap),
            queries::OUTGOING_EDGES => self.outgoing_edges(statement, row_cap),
            queries::ANSWERED_CHECK => self.answered_check(statement),
            other => self.lookup_fixture(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_properties(section_id: &str, input_params: &[&str]) -> IndexMap<String, TemplateValue> {
        let mut props = IndexMap::new();
        props.insert("sectionId".to_string(), TemplateValue::String(section_id.to_string()));
        props.insert("name".to_string(), TemplateValue::String(section_id.to_string()));
        props.insert(
            "inputParams".to_string(),
            TemplateValue::List(input_params.iter().map(|p| TemplateValue::String(p.to_string())).collect()),
        );
        props.insert("variables".to_string(), TemplateValue::List(vec![]));
        props
    }

    #[tokio::test]
    async fn latest_active_node_prefers_highest_active_version() {
        let store = InMemoryGraphStore::new();
        store.add_node_version(
            "SEC_PI",
            vec!["Section".into()],
            1,
            false,
            section_properties("SEC_PI", &[]),
        );
        store.add_node_version(
            "SEC_PI",
            vec!["Section".into()],
            2,
            true,
            section_properties("SEC_PI", &["applicantId"]),
        );

        let statement = CypherStatement::new(queries::LATEST_ACTIVE_NODE).with_param("id", TemplateValue::String("SEC_PI".into()));
        let outcome = store.run_query(&statement, Duration::from_millis(100), 10).await;
        let EvalOutcome::Ok(outcome) = outcome else { panic!("expected Ok") };
        let record = outcome.first().unwrap();
        assert_eq!(record.get("versionNumber"), Some(&TemplateValue::Int(2)));
    }

    #[tokio::test]
    async fn outgoing_edges_are_sorted_by_order_then_creation() {
        let store = InMemoryGraphStore::new();
        store.add_edge("SEC_X", EdgeFixture::precedes("Q2", 20, 1));
        store.add_edge("SEC_X", EdgeFixture::precedes("Q1", 10, 2));

        let statement = CypherStatement::new(queries::OUTGOING_EDGES).with_param("id", TemplateValue::String("SEC_X".into()));
        let EvalOutcome::Ok(outcome) = store.run_query(&statement, Duration::from_millis(100), 10).await else {
            panic!("expected Ok")
        };
        let targets: Vec<_> = outcome.records.iter().map(|r| r.get("to").cloned().unwrap()).collect();
        assert_eq!(targets, vec![TemplateValue::String("Q1".into()), TemplateValue::String("Q2".into())]);
    }

    #[tokio::test]
    async fn answered_check_reflects_marked_datapoints() {
        let store = InMemoryGraphStore::new();
        store.mark_answered("Q_FN", "P1");

        let answered = CypherStatement::new(queries::ANSWERED_CHECK)
            .with_param("question_id", TemplateValue::String("Q_FN".into()))
            .with_param("source_node_id", TemplateValue::String("P1".into()));
        let EvalOutcome::Ok(outcome) = store.run_query(&answered, Duration::from_millis(100), 10).await else {
            panic!("expected Ok")
        };
        assert!(!outcome.records.is_empty());

        let unanswered = CypherStatement::new(queries::ANSWERED_CHECK)
            .with_param("question_id", TemplateValue::String("Q_LN".into()))
            .with_param("source_node_id", TemplateValue::String("P1".into()));
        let EvalOutcome::Ok(outcome) = store.run_query(&unanswered, Duration::from_millis(100), 10).await else {
            panic!("expected Ok")
        };
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn unregistered_ad_hoc_statement_errors() {
        let store = InMemoryGraphStore::new();
        let statement = CypherStatement::new("MATCH (n) RETURN n");
        let outcome = store.run_query(&statement, Duration::from_millis(100), 10).await;
        assert!(matches!(outcome, EvalOutcome::Err(_)));
    }

    #[tokio::test]
    async fn row_cap_truncates_outgoing_edges() {
        let store = InMemoryGraphStore::new();
        for i in 0..5 {
            store.add_edge("SEC_X", EdgeFixture::precedes(format!("Q{i}"), i, i));
        }
        let statement = CypherStatement::new(queries::OUTGOING_EDGES).with_param("id", TemplateValue::String("SEC_X".into()));
        let EvalOutcome::Ok(outcome) = store.run_query(&statement, Duration::from_millis(100), 2).await else {
            panic!("expected Ok")
        };
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.truncated);
    }
}
