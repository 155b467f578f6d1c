//! Component C5: the `TraversalEngine`.
//!
//! Resolves the latest active version of each node, orders and gates
//! outgoing edges, evaluates `askWhen` predicates, resolves source nodes,
//! decides answered-ness, and dispatches to actions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{EngineError, EvalOutcome, Result};
use crate::graph_store::{CypherStatement, GraphStore, Record};
use crate::model::{Action, ActionKind, EdgeRecord, ExprBody, NodeKind, Question, Section};
use crate::queries;
use crate::value::TemplateValue;
use crate::variables::{self, VariableResolver};

/// A structural query timeout distinct from variable/predicate timeouts:
/// the three canonical statements are engine-authored and expected to be
/// cheap, so a single generous ceiling covers all of them.
const STRUCTURAL_QUERY_TIMEOUT_MS: u64 = 2000;

/// The result of a single `traverse` call.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalOutcome {
    UnansweredQuestion {
        question: Question,
        source_node: TemplateValue,
    },
    Action {
        action: Action,
    },
    Completed,
}

pub struct TraversalEngine {
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl TraversalEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    #[instrument(skip(self, context, resolver), fields(section_id = %starting_section_id))]
    pub async fn traverse(
        &self,
        starting_section_id: &str,
        context: &mut Context,
        resolver: &mut VariableResolver,
    ) -> Result<TraversalOutcome> {
        let record = self.fetch_node(starting_section_id).await?.ok_or_else(|| {
            EngineError::SectionNotFound(starting_section_id.to_string())
        })?;
        let section = self.deserialize_node::<Section>(&record)?;
        info!(section_id = %section.section_id, "entering section");
        resolver.push_scope(section.variables.clone());

        let mut steps = 0usize;
        self.process_node_edges(&section.section_id, context, resolver, &mut steps).await
    }

    /// Enumerate, gate, and select among a node's outgoing edges, then
    /// dispatch on the selected edge's target.
    fn process_node_edges<'a>(
        &'a self,
        node_id: &'a str,
        context: &'a mut Context,
        resolver: &'a mut VariableResolver,
        steps: &'a mut usize,
    ) -> BoxFuture<'a, Result<TraversalOutcome>> {
        Box::pin(async move {
            *steps += 1;
            if *steps > self.config.max_traversal_steps() {
                return Err(EngineError::TraversalDepthExceeded(self.config.max_traversal_steps()));
            }

            let mut edges = self.fetch_outgoing_edges(node_id).await?;
            edges.sort_by(|a, b| a.order_in_form.cmp(&b.order_in_form).then(a.created_at.cmp(&b.created_at)));

            for edge in &edges {
                if context.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                resolver.push_scope(edge.variables.clone());
                let truthy = self.evaluate_ask_when(edge, context, resolver).await;
                if !truthy {
                    resolver.pop_scope();
                    continue;
                }

                if let Some(raw) = &edge.source_node {
                    if !self.resolve_source_node(raw, context, resolver).await {
                        // Source-node resolution failed: abort only this
                        // edge and try the next one in sort order.
                        resolver.pop_scope();
                        continue;
                    }
                }

                let outcome = self.dispatch_edge(edge, context, resolver, steps).await;
                resolver.pop_scope();
                return outcome;
            }

            Ok(TraversalOutcome::Completed)
        })
    }

    async fn evaluate_ask_when(&self, edge: &EdgeRecord, context: &mut Context, resolver: &mut VariableResolver) -> bool {
        let Some(raw) = &edge.ask_when else {
            return true;
        };
        if raw.trim().is_empty() {
            return true;
        }
        match ExprBody::parse_prefixed(raw) {
            Ok(body) => match resolver.eval_ad_hoc(context, &body).await {
                EvalOutcome::Ok(value) => value.is_truthy(),
                other => {
                    let message = other.describe_failure().unwrap_or_default();
                    warn!(edge_to = %edge.to, message = %message, "askWhen evaluation failed, treating as false");
                    context.warn("askWhen", message);
                    false
                }
            },
            Err(e) => {
                context.warn("askWhen", e.to_string());
                false
            }
        }
    }

    /// Returns `true` if the source node was (re)resolved successfully
    /// (or left unchanged because no expression was given), `false` if
    /// resolution failed and the current edge must be abandoned.
    async fn resolve_source_node(&self, raw: &str, context: &mut Context, resolver: &mut VariableResolver) -> bool {
        match ExprBody::parse_prefixed(raw) {
            Ok(body) => match resolver.eval_ad_hoc(context, &body).await {
                EvalOutcome::Ok(value) => {
                    context.source_node = value;
                    true
                }
                other => {
                    let message = other.describe_failure().unwrap_or_default();
                    context.warn("sourceNode", message);
                    context.source_node = TemplateValue::Null;
                    false
                }
            },
            Err(e) => {
                context.warn("sourceNode", e.to_string());
                context.source_node = TemplateValue::Null;
                false
            }
        }
    }

    fn dispatch_edge<'a>(
        &'a self,
        edge: &'a EdgeRecord,
        context: &'a mut Context,
        resolver: &'a mut VariableResolver,
        steps: &'a mut usize,
    ) -> BoxFuture<'a, Result<TraversalOutcome>> {
        Box::pin(async move {
            let record = self.fetch_node(&edge.to).await?.ok_or_else(|| {
                EngineError::Model(crate::error::ModelError::AmbiguousExpression(format!(
                    "edge target '{}' has no active version",
                    edge.to
                )))
            })?;
            let kind = NodeKind::from_label(record.get("labels").and_then(first_label).unwrap_or_default());

            match kind {
                NodeKind::Question => self.dispatch_question(&record, context, resolver, steps).await,
                NodeKind::Action => self.dispatch_action(&record, context, resolver, steps).await,
                _ => {
                    // No defined semantics for edges targeting anything
                    // other than a question or action; pass through to
                    // the target's own outgoing edges.
                    self.process_node_edges(&edge.to, context, resolver, steps).await
                }
            }
        })
    }

    async fn dispatch_question<'a>(
        &'a self,
        record: &Record,
        context: &'a mut Context,
        resolver: &'a mut VariableResolver,
        steps: &'a mut usize,
    ) -> Result<TraversalOutcome> {
        let question = self.deserialize_node::<Question>(record)?;
        let answered = self.is_answered(&question.question_id, &context.source_node).await?;

        if answered {
            debug!(question_id = %question.question_id, "question already answered, continuing traversal");
            resolver.push_scope(question.variables.clone());
            let outcome = self.process_node_edges(&question.question_id, context, resolver, steps).await;
            resolver.pop_scope();
            outcome
        } else {
            debug!(question_id = %question.question_id, "question unanswered, stopping traversal");
            Ok(TraversalOutcome::UnansweredQuestion {
                source_node: context.source_node.clone(),
                question,
            })
        }
    }

    async fn dispatch_action<'a>(
        &'a self,
        record: &Record,
        context: &'a mut Context,
        resolver: &'a mut VariableResolver,
        steps: &'a mut usize,
    ) -> Result<TraversalOutcome> {
        let action = self.deserialize_node::<Action>(record)?;
        self.execute_action(&action, context, resolver).await?;

        if action.return_immediately {
            Ok(TraversalOutcome::Action { action })
        } else {
            resolver.push_scope(action.variables.clone());
            let outcome = self.process_node_edges(&action.action_id, context, resolver, steps).await;
            resolver.pop_scope();
            outcome
        }
    }

    async fn execute_action(&self, action: &Action, context: &mut Context, resolver: &mut VariableResolver) -> Result<()> {
        resolver.push_scope(action.variables.clone());

        if let Some(raw) = &action.source_node {
            self.resolve_source_node(raw, context, resolver).await;
        }

        let result = match &action.kind {
            ActionKind::CreatePropertyNode { body, .. } => {
                let rendered = variables::render_template(resolver, context, body).await;
                let statement = CypherStatement::new(rendered);
                match self
                    .store
                    .run_query(&statement, self.config.expr_timeout(), self.config.row_cap())
                    .await
                {
                    EvalOutcome::Ok(outcome) => {
                        if outcome.truncated {
                            context.warn(action.action_id.clone(), "createdId result set truncated at row cap");
                        }
                        for record in &outcome.records {
                            if let Some(id) = record.get("createdId") {
                                context.push_created_node_id(id.clone());
                            }
                        }
                        Ok(())
                    }
                    other => Err(EngineError::ActionQueryFailed {
                        action_id: action.action_id.clone(),
                        message: other.describe_failure().unwrap_or_default(),
                    }),
                }
            }
            ActionKind::GotoSection { next_section_id, expr } => {
                if let Some(id) = next_section_id {
                    context.next_section_id = Some(id.clone());
                } else if let Some(e) = expr {
                    let rendered = variables::render_template(resolver, context, e).await;
                    context.next_section_id = Some(rendered);
                }
                Ok(())
            }
            ActionKind::MarkSectionComplete { body } => {
                let rendered = variables::render_template(resolver, context, body).await;
                let statement = CypherStatement::new(rendered);
                match self
                    .store
                    .run_query(&statement, self.config.expr_timeout(), self.config.row_cap())
                    .await
                {
                    EvalOutcome::Ok(_) => {
                        context.completed = true;
                        Ok(())
                    }
                    other => Err(EngineError::ActionQueryFailed {
                        action_id: action.action_id.clone(),
                        message: other.describe_failure().unwrap_or_default(),
                    }),
                }
            }
        };

        resolver.pop_scope();
        result
    }

    async fn is_answered(&self, question_id: &str, source_node: &TemplateValue) -> Result<bool> {
        let source_id = match source_node {
            TemplateValue::Node(node) => TemplateValue::String(node.id.clone()),
            TemplateValue::String(s) => TemplateValue::String(s.clone()),
            _ => TemplateValue::Null,
        };
        let statement = CypherStatement::new(queries::ANSWERED_CHECK)
            .with_param("question_id", TemplateValue::String(question_id.to_string()))
            .with_param("source_node_id", source_id);

        match self
            .store
            .run_query(&statement, std::time::Duration::from_millis(STRUCTURAL_QUERY_TIMEOUT_MS), 1)
            .await
        {
            EvalOutcome::Ok(outcome) => Ok(!outcome.records.is_empty()),
            other => Err(EngineError::Unavailable(other.describe_failure().unwrap_or_default())),
        }
    }

    async fn fetch_node(&self, id: &str) -> Result<Option<Record>> {
        let statement = CypherStatement::new(queries::LATEST_ACTIVE_NODE).with_param("id", TemplateValue::String(id.to_string()));
        match self
            .store
            .run_query(&statement, std::time::Duration::from_millis(STRUCTURAL_QUERY_TIMEOUT_MS), 1)
            .await
        {
            EvalOutcome::Ok(outcome) => Ok(outcome.first().cloned()),
            other => Err(EngineError::Unavailable(other.describe_failure().unwrap_or_default())),
        }
    }

    async fn fetch_outgoing_edges(&self, id: &str) -> Result<Vec<EdgeRecord>> {
        let statement = CypherStatement::new(queries::OUTGOING_EDGES).with_param("id", TemplateValue::String(id.to_string()));
        let outcome = match self
            .store
            .run_query(&statement, std::time::Duration::from_millis(STRUCTURAL_QUERY_TIMEOUT_MS), self.config.row_cap())
            .await
        {
            EvalOutcome::Ok(outcome) => outcome,
            other => return Err(EngineError::Unavailable(other.describe_failure().unwrap_or_default())),
        };
        if outcome.truncated {
            warn!(node_id = %id, "outgoing edge enumeration truncated at row cap");
        }
        outcome
            .records
            .iter()
            .map(record_to_edge)
            .collect::<std::result::Result<Vec<_>, _>>()
    }

    fn deserialize_node<T: serde::de::DeserializeOwned>(&self, record: &Record) -> Result<T> {
        let properties = record
            .get("properties")
            .cloned()
            .unwrap_or(TemplateValue::Map(Default::default()));
        serde_json::from_value(properties.to_json())
            .map_err(|e| EngineError::Model(crate::error::ModelError::AmbiguousExpression(e.to_string())))
    }
}

fn first_label(value: &TemplateValue) -> Option<&str> {
    match value {
        TemplateValue::List(items) => items.first().and_then(|v| match v {
            TemplateValue::String(s) => Some(s.as_str()),
            _ => None,
        }),
        _ => None,
    }
}

fn record_to_edge(record: &Record) -> Result<EdgeRecord> {
    serde_json::from_value(TemplateValue::Map(record.clone()).to_json())
        .map_err(|e| EngineError::Model(crate::error::ModelError::AmbiguousExpression(e.to_string())))
}
