//! [`RhaiSandbox`]: the `ScriptSandbox` implementation backing `python:`
//! expression bodies.
//!
//! Every evaluation runs on a blocking thread (rhai is synchronous) with
//! two independent ceilings: the engine's own `on_progress` deadline check
//! (which halts a running script from the inside) and an outer
//! `tokio::time::timeout` around the `spawn_blocking` join (which bounds
//! how long the caller waits even if the inside check is slow to fire).
//! Whichever trips first wins; a task that outlives the outer timeout is
//! left to finish and is never joined, since rhai's progress hook is the
//! only cooperative way to stop it short of killing the thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rhai::{Dynamic, Engine, Scope};
use tracing::warn;

use questionnaire_core::error::EvalOutcome;
use questionnaire_core::sandbox::ScriptSandbox;
use questionnaire_core::value::TemplateValue;

use crate::engine::{build_engine, Limits};
use crate::error::SandboxError;

static RESERVED_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_])_[A-Za-z0-9_]*").unwrap());

pub struct RhaiSandbox {
    engine: Arc<Engine>,
}

impl RhaiSandbox {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            engine: Arc::new(build_engine(limits)),
        }
    }
}

impl Default for RhaiSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptSandbox for RhaiSandbox {
    async fn eval(&self, expression: &str, context: &TemplateValue, timeout: Duration) -> EvalOutcome<TemplateValue> {
        if RESERVED_IDENTIFIER.is_match(expression) {
            return EvalOutcome::Denied("expression references a reserved (underscore-prefixed) name".to_string());
        }

        let engine = self.engine.clone();
        let expression = expression.to_string();
        let context_json = context.to_json();
        let deadline = Instant::now() + timeout;

        let join = tokio::task::spawn_blocking(move || run(&engine, &expression, &context_json, deadline));

        match tokio::time::timeout(timeout, join).await {
            Err(_) => {
                warn!("sandbox evaluation exceeded outer deadline");
                EvalOutcome::Timeout
            }
            Ok(Err(join_error)) => EvalOutcome::Err(format!("sandbox task failed: {join_error}")),
            Ok(Ok(outcome)) => outcome,
        }
    }
}

fn run(engine: &Engine, expression: &str, context_json: &serde_json::Value, deadline: Instant) -> EvalOutcome<TemplateValue> {
    let mut scope = Scope::new();
    if let serde_json::Value::Object(map) = context_json {
        for (key, value) in map {
            match rhai::serde::to_dynamic(value.clone()) {
                Ok(dynamic) => {
                    scope.push_dynamic(key.clone(), dynamic);
                }
                Err(e) => return EvalOutcome::Err(format!("failed to bind '{key}' into sandbox scope: {e}")),
            }
        }
    }

    let mut engine = engine.clone();
    engine.on_progress(move |_ops| if Instant::now() >= deadline { Some(Dynamic::UNIT) } else { None });

    // Full script evaluation, not `eval_expression_with_scope`: a variable
    // body or predicate that loops (the runaway-script case the operation
    // ceiling and wall-clock deadline above both exist to catch) needs
    // `while`/`let` to be parseable in the first place. Nothing registered
    // in `build_engine` grants file/network/process access either way.
    match engine.eval_with_scope::<Dynamic>(&mut scope, expression) {
        Ok(dynamic) => dynamic_to_template_value(dynamic),
        Err(err) => classify_error(*err),
    }
}

fn dynamic_to_template_value(dynamic: Dynamic) -> EvalOutcome<TemplateValue> {
    match rhai::serde::from_dynamic::<serde_json::Value>(&dynamic) {
        Ok(json) => EvalOutcome::Ok(TemplateValue::from(&json)),
        Err(e) => EvalOutcome::Err(format!("could not convert sandbox result: {e}")),
    }
}

fn classify_error(err: rhai::EvalAltResult) -> EvalOutcome<TemplateValue> {
    use rhai::EvalAltResult::*;
    match err {
        ErrorTerminated(..) => EvalOutcome::Timeout,
        ErrorTooManyOperations(..) | ErrorDataTooLarge(..) | ErrorStackOverflow(..) => {
            EvalOutcome::Err(SandboxError::Denied(err.to_string()).to_string())
        }
        other => EvalOutcome::Err(SandboxError::Eval(other.to_string()).to_string()),
    }
}

/// Truthiness rule for `askWhen`/`sourceNode` predicates backed by a
/// `python:` (rhai) expression: mirrors `TemplateValue::is_truthy`, with
/// empty string/array/map and zero all falsy, matching the bare-value
/// truthiness test suite this sandbox is checked against.
pub fn is_truthy(value: &TemplateValue) -> bool {
    value.is_truthy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn sandbox() -> RhaiSandbox {
        RhaiSandbox::new()
    }

    #[tokio::test]
    async fn evaluates_arithmetic_expression() {
        let result = sandbox().eval("1 + 2 * 3", &TemplateValue::Null, Duration::from_millis(200)).await;
        assert_eq!(result, EvalOutcome::Ok(TemplateValue::Int(7)));
    }

    #[tokio::test]
    async fn resolves_bound_context_variable() {
        let mut map = IndexMap::new();
        map.insert("age".to_string(), TemplateValue::Int(42));
        let context = TemplateValue::Map(map);
        let result = sandbox().eval("age >= 18", &context, Duration::from_millis(200)).await;
        assert_eq!(result, EvalOutcome::Ok(TemplateValue::Bool(true)));
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        // The default operation ceiling (100_000) would otherwise plausibly
        // trip before either deadline-based mechanism on a tight increment
        // loop, yielding `Denied` instead of `Timeout`. Disabling it here
        // isolates the wall-clock guarantee this test actually checks.
        let unlimited = RhaiSandbox::with_limits(Limits { max_operations: 0, ..Limits::default() });
        let result = unlimited
            .eval("let x = 0; while true { x += 1; }", &TemplateValue::Null, Duration::from_millis(50))
            .await;
        assert_eq!(result, EvalOutcome::Timeout);
    }

    #[tokio::test]
    async fn reserved_identifier_is_denied() {
        let result = sandbox().eval("_internal_state", &TemplateValue::Null, Duration::from_millis(200)).await;
        assert!(matches!(result, EvalOutcome::Denied(_)));
    }

    #[tokio::test]
    async fn syntax_error_is_reported() {
        let result = sandbox().eval("1 +", &TemplateValue::Null, Duration::from_millis(200)).await;
        assert!(matches!(result, EvalOutcome::Err(_)));
    }

    #[test]
    fn truthiness_matches_empty_collection_and_zero_rules() {
        assert!(!is_truthy(&TemplateValue::Int(0)));
        assert!(!is_truthy(&TemplateValue::String(String::new())));
        assert!(!is_truthy(&TemplateValue::List(vec![])));
        assert!(!is_truthy(&TemplateValue::Map(IndexMap::new())));
        assert!(is_truthy(&TemplateValue::String("0".to_string())));
    }
}
