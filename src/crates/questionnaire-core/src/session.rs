//! Component C6: the session/response assembler.
//!
//! `Session::handle` is the single entry point a host process calls per
//! request: it validates the payload, builds a fresh [`Context`], runs one
//! traversal, and shapes the response. Nothing here is reused across
//! requests beyond the `Arc`-shared `GraphStore`/`ScriptSandbox` and the
//! process-wide `EngineConfig`.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{EngineError, Result, Warning};
use crate::graph_store::GraphStore;
use crate::model::Section;
use crate::sandbox::ScriptSandbox;
use crate::traversal::{TraversalEngine, TraversalOutcome};
use crate::value::TemplateValue;
use crate::variables::VariableResolver;

/// `POST /v1/api/next_question_flow` request body: `sectionId` plus
/// whatever input parameters the section declares. Extra fields beyond
/// `sectionId` are not individually typed since the parameter set is
/// schema-defined, not fixed at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct NextQuestionRequest {
    #[serde(rename = "sectionId")]
    pub section_id: String,
    #[serde(flatten)]
    pub inputs: IndexMap<String, Json>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarEntry {
    pub value: Json,
    pub raw: Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextQuestionResponse {
    #[serde(rename = "sectionId")]
    pub section_id: String,
    pub question: Option<Json>,
    #[serde(rename = "nextSectionId")]
    pub next_section_id: Option<String>,
    #[serde(rename = "createdNodeIds")]
    pub created_node_ids: Vec<Json>,
    pub completed: bool,
    #[serde(rename = "requestVariables")]
    pub request_variables: IndexMap<String, Json>,
    #[serde(rename = "sourceNode")]
    pub source_node: Option<Json>,
    pub vars: IndexMap<String, VarEntry>,
    pub warnings: Vec<Warning>,
}

pub struct Session {
    store: Arc<dyn GraphStore>,
    sandbox: Arc<dyn ScriptSandbox>,
    config: EngineConfig,
}

impl Session {
    pub fn new(store: Arc<dyn GraphStore>, sandbox: Arc<dyn ScriptSandbox>, config: EngineConfig) -> Self {
        Self { store, sandbox, config }
    }

    /// Run one traversal with no cancellation signal. Equivalent to
    /// `handle_cancellable(request, None)`.
    #[instrument(skip(self, request), fields(section_id = %request.section_id))]
    pub async fn handle(&self, request: NextQuestionRequest) -> Result<NextQuestionResponse> {
        self.handle_cancellable(request, None).await
    }

    /// Run one traversal, aborting at the next edge-selection boundary if
    /// `cancellation` is cancelled mid-request. A host that cancels by
    /// dropping the future instead of signalling a token gets the same
    /// effect for free, since the `Context` being built is simply dropped.
    #[instrument(skip(self, request, cancellation), fields(section_id = %request.section_id))]
    pub async fn handle_cancellable(
        &self,
        request: NextQuestionRequest,
        cancellation: Option<CancellationToken>,
    ) -> Result<NextQuestionResponse> {
        if request.section_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("sectionId is required".to_string()));
        }

        let inputs: IndexMap<String, TemplateValue> = request
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::from(v)))
            .collect();

        let engine = TraversalEngine::new(self.store.clone(), self.config.clone());
        let mut resolver = VariableResolver::new(self.store.clone(), self.sandbox.clone());
        let mut context = Context::new(inputs);
        if let Some(token) = cancellation {
            context = context.with_cancellation(token);
        }

        let outcome = engine.traverse(&request.section_id, &mut context, &mut resolver).await?;
        info!(section_id = %request.section_id, "traversal complete");

        Ok(self.assemble(request.section_id, context, resolver, outcome))
    }

    fn assemble(
        &self,
        section_id: String,
        context: Context,
        resolver: VariableResolver,
        outcome: TraversalOutcome,
    ) -> NextQuestionResponse {
        let (question, source_node) = match &outcome {
            TraversalOutcome::UnansweredQuestion { question, source_node } => {
                (Some(serde_json::to_value(question).unwrap_or(Json::Null)), Some(source_node.to_json()))
            }
            TraversalOutcome::Action { .. } | TraversalOutcome::Completed => {
                let source = if context.source_node == TemplateValue::Null {
                    None
                } else {
                    Some(context.source_node.to_json())
                };
                (None, source)
            }
        };

        let vars = resolver
            .materialized()
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    VarEntry {
                        value: m.value.to_json(),
                        raw: m.raw.to_json(),
                    },
                )
            })
            .collect();

        NextQuestionResponse {
            section_id,
            question,
            next_section_id: context.next_section_id,
            created_node_ids: context.created_node_ids.iter().map(TemplateValue::to_json).collect(),
            completed: context.completed,
            request_variables: context.inputs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            source_node,
            vars,
            warnings: context.warnings,
        }
    }
}

/// Validate that a request supplies every input parameter the section
/// declares, used by hosts that pre-fetch the section before calling
/// [`Session::handle`] in order to fail fast with a precise message. Not
/// invoked internally by `handle` itself, since the section's declared
/// parameter list is only known after the first structural query the
/// traversal engine issues.
pub fn missing_inputs(section: &Section, request: &NextQuestionRequest) -> Vec<String> {
    section
        .input_params
        .iter()
        .filter(|p| !request.inputs.contains_key(p.as_str()))
        .cloned()
        .collect()
}
