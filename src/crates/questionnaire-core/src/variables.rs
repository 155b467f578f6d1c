//! Component C4: the `VariableResolver`.
//!
//! Lazily evaluates named variable definitions attached to sections, edges,
//! and actions, caching each result at most once per request and recording
//! a warning on failure instead of propagating an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::EvalOutcome;
use crate::graph_store::{CypherStatement, GraphStore};
use crate::model::{ExprBody, VariableDef};
use crate::sandbox::ScriptSandbox;
use crate::template::{self, TemplateLookup};
use crate::value::{TemplateDialect, TemplateValue};

/// Ad hoc-expression timeout used for `askWhen` predicates and `sourceNode`
/// resolution when the edge/action itself specifies none.
pub const DEFAULT_EXPR_TIMEOUT_MS: u64 = 1500;

/// One variable that was actually materialised during the request: `raw` is
/// the evaluator's unprocessed return value, `value` the parsed/normalised
/// form reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedVariable {
    pub value: TemplateValue,
    pub raw: TemplateValue,
}

pub struct VariableResolver {
    store: Arc<dyn GraphStore>,
    sandbox: Arc<dyn ScriptSandbox>,
    /// Evaluated (or failed-and-nulled) results, keyed by variable name.
    cache: IndexMap<String, MaterializedVariable>,
    /// Names that have already been attempted, whether or not evaluation
    /// succeeded — guarantees at-most-once evaluation per request.
    attempted: HashSet<String>,
    /// Definition scopes currently in effect, outermost first: section,
    /// then the current node, then (while traversing one) the current
    /// edge. Lookup searches innermost first.
    scopes: Vec<Vec<VariableDef>>,
}

impl VariableResolver {
    pub fn new(store: Arc<dyn GraphStore>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self {
            store,
            sandbox,
            cache: IndexMap::new(),
            attempted: HashSet::new(),
            scopes: Vec::new(),
        }
    }

    pub fn push_scope(&mut self, defs: Vec<VariableDef>) {
        self.scopes.push(defs);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn find_definition(&self, name: &str) -> Option<VariableDef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().find(|d| d.name == name))
            .cloned()
    }

    /// Cached value if present; otherwise locates the definition in the
    /// current scope chain and evaluates it. Returns `None` if no
    /// definition exists for `name` at all (distinct from a definition
    /// that evaluated to `Null` or failed).
    pub async fn get(&mut self, context: &mut Context, name: &str) -> Option<TemplateValue> {
        if let Some(cached) = self.cache.get(name) {
            return Some(cached.value.clone());
        }
        let def = self.find_definition(name)?;
        Some(self.eval_definition(context, &def).await)
    }

    /// Every variable materialised so far this request, for response
    /// shaping (`vars`).
    pub fn materialized(&self) -> &IndexMap<String, MaterializedVariable> {
        &self.cache
    }

    /// Evaluate a variable definition directly (used when the caller
    /// already holds the definition, e.g. while iterating a section's
    /// declared variables up front). At-most-once per request: a second
    /// call for the same name returns the cached result without
    /// re-running the evaluator.
    pub async fn eval_definition(&mut self, context: &mut Context, def: &VariableDef) -> TemplateValue {
        if let Some(cached) = self.cache.get(&def.name) {
            return cached.value.clone();
        }
        self.attempted.insert(def.name.clone());

        let body = match def.resolved_body() {
            Ok(b) => b,
            Err(e) => {
                context.warn(&def.name, e.to_string());
                self.cache.insert(
                    def.name.clone(),
                    MaterializedVariable {
                        value: TemplateValue::Null,
                        raw: TemplateValue::Null,
                    },
                );
                return TemplateValue::Null;
            }
        };

        let timeout = Duration::from_millis(def.timeout_ms());
        let outcome = self.eval_expr(context, &body, timeout).await;
        let materialized = self.normalize_outcome(context, &def.name, outcome, timeout);
        let value = materialized.value.clone();
        self.cache.insert(def.name.clone(), materialized);
        value
    }

    /// Evaluate an ad hoc expression body (an `askWhen` predicate or a
    /// `sourceNode` expression) that is not attached to a named variable
    /// and therefore never populates the cache. Renders templates in the
    /// body first, then dispatches to the store or sandbox per its tag,
    /// under the ad hoc default timeout (distinct from a named variable's
    /// own `timeoutMs`).
    pub async fn eval_ad_hoc(&mut self, context: &mut Context, body: &ExprBody) -> EvalOutcome<TemplateValue> {
        self.eval_expr(context, body, Duration::from_millis(DEFAULT_EXPR_TIMEOUT_MS)).await
    }

    async fn eval_expr(&mut self, context: &mut Context, body: &ExprBody, timeout: Duration) -> EvalOutcome<TemplateValue> {
        let dialect = match body {
            ExprBody::Cypher(_) => TemplateDialect::Json,
            ExprBody::Python(_) => TemplateDialect::Rhai,
        };
        let mut render_warnings = Vec::new();
        let rendered = {
            let mut adapter = LookupAdapter {
                resolver: self,
                context,
            };
            template::render(body.body(), &mut adapter, dialect, &mut render_warnings).await
        };
        context.warnings.extend(render_warnings);
        match body {
            ExprBody::Cypher(_) => {
                debug!(statement = %rendered, "executing ad hoc cypher statement");
                let statement = CypherStatement::new(rendered);
                self.store
                    .run_query(&statement, timeout, 1)
                    .await
                    .map(|outcome| TemplateValue::Bool(!outcome.records.is_empty()))
            }
            ExprBody::Python(_) => {
                debug!(expression = %rendered, "evaluating sandboxed expression");
                self.sandbox.eval(&rendered, &context_value(context), timeout).await
            }
        }
    }

    fn normalize_outcome(
        &mut self,
        context: &mut Context,
        name: &str,
        outcome: EvalOutcome<TemplateValue>,
        _timeout: Duration,
    ) -> MaterializedVariable {
        match outcome {
            EvalOutcome::Ok(raw) => {
                let value = match &raw {
                    TemplateValue::String(s) => TemplateValue::try_parse_json(s).unwrap_or_else(|| raw.clone()),
                    other => other.clone(),
                };
                MaterializedVariable { value, raw }
            }
            other => {
                let message = other.describe_failure().unwrap_or_default();
                warn!(variable = name, message = %message, "variable evaluation failed");
                context.warn(name, message);
                MaterializedVariable {
                    value: TemplateValue::Null,
                    raw: TemplateValue::Null,
                }
            }
        }
    }
}

fn context_value(context: &Context) -> TemplateValue {
    let mut map = IndexMap::new();
    map.insert("sourceNode".to_string(), context.source_node.clone());
    for (k, v) in &context.inputs {
        map.insert(k.clone(), v.clone());
    }
    TemplateValue::Map(map)
}

/// Adapts a `(&mut VariableResolver, &mut Context)` pair into the
/// [`TemplateLookup`] trait the renderer expects, implementing the lookup
/// order from the template component: variable cache/definition, then
/// input parameters, then reserved names.
struct LookupAdapter<'a> {
    resolver: &'a mut VariableResolver,
    context: &'a mut Context,
}

#[async_trait]
impl<'a> TemplateLookup for LookupAdapter<'a> {
    async fn lookup_root(&mut self, name: &str) -> Option<TemplateValue> {
        if let Some(value) = self.resolver.get(self.context, name).await {
            return Some(value);
        }
        if let Some(value) = self.context.inputs.get(name) {
            return Some(value.clone());
        }
        self.context.lookup_reserved(name)
    }
}

/// Public entry point used by the traversal engine and action execution to
/// render a schema-authored string against the current resolver/context
/// pair. Action bodies are `GraphStore` statement text (or, for a
/// `GotoSection` expression, plain text), never a sandboxed expression, so
/// this always renders in the JSON dialect.
pub async fn render_template(
    resolver: &mut VariableResolver,
    context: &mut Context,
    source: &str,
) -> String {
    let mut warnings = Vec::new();
    let rendered = {
        let mut adapter = LookupAdapter { resolver, context };
        template::render(source, &mut adapter, TemplateDialect::Json, &mut warnings).await
    };
    context.warnings.extend(warnings);
    rendered
}
