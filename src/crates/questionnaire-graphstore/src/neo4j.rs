//! Neo4j-backed [`GraphStore`]: binds the three canonical statements to
//! typed row reads, and passes ad hoc statement text straight through to
//! the driver.
//!
//! Full generic row decoding would require either parsing a statement's
//! `RETURN` clause or carrying per-statement column schemas; neither is in
//! scope here. Ad hoc statements therefore come back as acknowledgement
//! records, one per returned row, each carrying `matched: true` plus a
//! `createdId` column when the statement returns one — `execute_action`
//! reads that column back out of a `CreatePropertyNode` body, so it is
//! decoded by name same as the three canonical queries' columns are.
//! Any other column in an ad hoc statement's result is not decoded; a named
//! variable's `cypher` body only ever needs the "did this return any rows"
//! answer `VariableResolver` already extracts from `matched`.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use neo4rs::{BoltType, Graph, Query};
use tracing::debug;

use questionnaire_core::error::EvalOutcome;
use questionnaire_core::graph_store::{CypherStatement, GraphStore, QueryOutcome, Record};
use questionnaire_core::queries;
use questionnaire_core::value::TemplateValue;

use crate::error::GraphStoreError;

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, GraphStoreError> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| GraphStoreError::Unavailable(e.to_string()))?;
        Ok(Self { graph })
    }

    async fn run(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphStoreError> {
        let mut stream = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(|e| GraphStoreError::Query(e.to_string()))? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn latest_active_node(&self, statement: &CypherStatement, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        let Some(id) = string_param(statement, "id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("id".into()).to_string());
        };
        let query = Query::new(
            "MATCH (n {id: $id}) WHERE n.active = true \
             RETURN n.id AS id, labels(n) AS labels, properties(n) AS properties, n.versionNumber AS versionNumber \
             ORDER BY n.versionNumber DESC LIMIT 1"
                .to_string(),
        )
        .param("id", id.clone());

        match self.run(query).await {
            Err(e) => EvalOutcome::Err(e.to_string()),
            Ok(rows) => {
                let records = rows
                    .iter()
                    .filter_map(|row| {
                        let id: String = row.get("id").ok()?;
                        let labels: Vec<String> = row.get("labels").ok()?;
                        let properties: serde_json::Value = row.get("properties").ok()?;
                        let version_number: i64 = row.get("versionNumber").ok()?;
                        let mut record: Record = IndexMap::new();
                        record.insert("id".to_string(), TemplateValue::String(id));
                        record.insert(
                            "labels".to_string(),
                            TemplateValue::List(labels.into_iter().map(TemplateValue::String).collect()),
                        );
                        record.insert("properties".to_string(), TemplateValue::from(&properties));
                        record.insert("versionNumber".to_string(), TemplateValue::Int(version_number));
                        Some(record)
                    })
                    .collect();
                EvalOutcome::Ok(truncate(records, row_cap))
            }
        }
    }

    async fn outgoing_edges(&self, statement: &CypherStatement, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        let Some(id) = string_param(statement, "id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("id".into()).to_string());
        };
        let query = Query::new(
            "MATCH (n {id: $id})-[r:PRECEDES|TRIGGERS]->(m) WHERE m.active = true \
             RETURN type(r) AS kind, m.id AS to, r.orderInForm AS orderInForm, r.askWhen AS askWhen, \
                    r.sourceNode AS sourceNode, r.variables AS variables, r.createdAt AS createdAt \
             ORDER BY r.orderInForm ASC, r.createdAt ASC"
                .to_string(),
        )
        .param("id", id.clone());

        match self.run(query).await {
            Err(e) => EvalOutcome::Err(e.to_string()),
            Ok(rows) => {
                let records = rows
                    .iter()
                    .filter_map(|row| {
                        let kind: String = row.get("kind").ok()?;
                        let to: String = row.get("to").ok()?;
                        let order_in_form: i64 = row.get("orderInForm").ok()?;
                        let ask_when: Option<String> = row.get("askWhen").ok();
                        let source_node: Option<String> = row.get("sourceNode").ok();
                        let variables: Option<serde_json::Value> = row.get("variables").ok();
                        let created_at: i64 = row.get("createdAt").ok()?;
                        let mut record: Record = IndexMap::new();
                        record.insert("kind".to_string(), TemplateValue::String(kind));
                        record.insert("to".to_string(), TemplateValue::String(to));
                        record.insert("orderInForm".to_string(), TemplateValue::Int(order_in_form));
                        record.insert(
                            "askWhen".to_string(),
                            ask_when.map(TemplateValue::String).unwrap_or(TemplateValue::Null),
                        );
                        record.insert(
                            "sourceNode".to_string(),
                            source_node.map(TemplateValue::String).unwrap_or(TemplateValue::Null),
                        );
                        record.insert(
                            "variables".to_string(),
                            variables.map(|v| TemplateValue::from(&v)).unwrap_or(TemplateValue::List(vec![])),
                        );
                        record.insert("createdAt".to_string(), TemplateValue::Int(created_at));
                        Some(record)
                    })
                    .collect();
                EvalOutcome::Ok(truncate(records, row_cap))
            }
        }
    }

    async fn answered_check(&self, statement: &CypherStatement) -> EvalOutcome<QueryOutcome> {
        let Some(question_id) = string_param(statement, "question_id") else {
            return EvalOutcome::Err(GraphStoreError::MalformedParams("question_id".into()).to_string());
        };
        let source_node_id = match param(statement, "source_node_id") {
            Some(TemplateValue::String(s)) => s.clone(),
            _ => return EvalOutcome::Ok(QueryOutcome::empty()),
        };
        let query = Query::new(
            "MATCH (src {id: $sourceId})-[:SUPPLIES]->(:Datapoint)-[:ANSWERS]->(q {id: $questionId}) \
             RETURN true AS answered LIMIT 1"
                .to_string(),
        )
        .param("sourceId", source_node_id)
        .param("questionId", question_id.clone());

        match self.run(query).await {
            Err(e) => EvalOutcome::Err(e.to_string()),
            Ok(rows) if rows.is_empty() => EvalOutcome::Ok(QueryOutcome::empty()),
            Ok(_) => {
                let mut record: Record = IndexMap::new();
                record.insert("answered".to_string(), TemplateValue::Bool(true));
                EvalOutcome::Ok(QueryOutcome::single(record))
            }
        }
    }

    async fn ad_hoc(&self, statement: &CypherStatement, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        debug!(statement = %statement.template, "executing ad hoc statement against neo4j");
        let mut query = Query::new(statement.template.clone());
        for (name, value) in &statement.params {
            query = query.param(name, to_bolt(value));
        }
        match self.run(query).await {
            Err(e) => EvalOutcome::Err(e.to_string()),
            Ok(rows) => {
                if rows.is_empty() {
                    EvalOutcome::Ok(QueryOutcome::empty())
                } else {
                    let records = rows
                        .iter()
                        .map(|row| {
                            let mut record: Record = IndexMap::new();
                            record.insert("matched".to_string(), TemplateValue::Bool(true));
                            if let Some(created_id) = created_id_column(row) {
                                record.insert("createdId".to_string(), created_id);
                            }
                            record
                        })
                        .collect();
                    EvalOutcome::Ok(truncate(records, row_cap))
                }
            }
        }
    }
}

/// `CreatePropertyNode` action bodies are expected to `RETURN ... AS
/// createdId` -- the one ad hoc result column `execute_action` in
/// `questionnaire-core` actually reads back out. Neo4j's row API requires
/// a column name up front (there is no way to enumerate a row's columns
/// generically), so this is the one column a pass-through ad hoc statement
/// decodes by name rather than leaving every result as a bare
/// acknowledgement record; any other returned columns are still not
/// decoded (see the module's full-row-decoding scope note above).
fn created_id_column(row: &neo4rs::Row) -> Option<TemplateValue> {
    if let Ok(v) = row.get::<i64>("createdId") {
        return Some(TemplateValue::Int(v));
    }
    if let Ok(v) = row.get::<String>("createdId") {
        return Some(TemplateValue::String(v));
    }
    if let Ok(v) = row.get::<f64>("createdId") {
        return Some(TemplateValue::Float(v));
    }
    None
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

fn to_bolt(value: &TemplateValue) -> BoltType {
    match value {
        TemplateValue::Null => BoltType::Null(neo4rs::BoltNull),
        TemplateValue::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        TemplateValue::Int(i) => BoltType::Integer(neo4rs::BoltInteger::new(*i)),
        TemplateValue::Float(f) => BoltType::Float(neo4rs::BoltFloat::new(*f)),
        TemplateValue::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
        TemplateValue::List(items) => BoltType::List(neo4rs::BoltList::from(items.iter().map(to_bolt).collect::<Vec<_>>())),
        TemplateValue::Map(map) => {
            let mut bolt_map = neo4rs::BoltMap::default();
            for (k, v) in map {
                bolt_map.put(neo4rs::BoltString::new(k), to_bolt(v));
            }
            BoltType::Map(bolt_map)
        }
        TemplateValue::Node(node) => {
            let mut bolt_map = neo4rs::BoltMap::default();
            for (k, v) in &node.properties {
                bolt_map.put(neo4rs::BoltString::new(k), to_bolt(v));
            }
            BoltType::Map(bolt_map)
        }
    }
}

fn truncate(mut records: Vec<Record>, row_cap: usize) -> QueryOutcome {
    let truncated = records.len() > row_cap;
    records.truncate(row_cap);
    QueryOutcome { records, truncated }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn run_query(&self, statement: &CypherStatement, _timeout: Duration, row_cap: usize) -> EvalOutcome<QueryOutcome> {
        match statement.template.as_str() {
            queries::LATEST_ACTIVE_NODE => self.latest_active_node(statement, row_cap).await,
            queries::OUTGOING_EDGES => self.outgoing_edges(statement, row_cap).await,
            queries::ANSWERED_CHECK => self.answered_check(statement).await,
            _ => self.ad_hoc(statement, row_cap).await,
        }
    }
}
