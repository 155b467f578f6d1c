//! The `ScriptSandbox` abstract collaborator (component C2).
//!
//! Evaluates `python:`-tagged expression bodies (variable definitions,
//! `askWhen` predicates, `sourceNode` expressions) in a restricted
//! environment. The reference implementation in `questionnaire-rhai-sandbox`
//! actually runs a whitelisted `rhai` subset, not Python; "python" here is
//! the schema's own label for "the non-Cypher expression language", carried
//! over verbatim from the schema format this engine interprets.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::EvalOutcome;
use crate::value::TemplateValue;

/// Abstract collaborator C2: evaluates one expression body against a
/// read-only context value and returns a single [`TemplateValue`].
///
/// `context` is always a [`TemplateValue::Map`] binding whatever names are
/// in scope for the expression (`sourceNode`, resolved variables, input
/// parameters) — the sandbox never has access to anything outside it.
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    async fn eval(
        &self,
        expression: &str,
        context: &TemplateValue,
        timeout: Duration,
    ) -> EvalOutcome<TemplateValue>;
}
