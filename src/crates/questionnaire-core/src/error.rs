//! Error types for the questionnaire traversal engine.
//!
//! # Error Hierarchy
//!
//! ```text
//! EngineError
//! ├── InvalidRequest        - malformed/missing request fields (surfaced, HTTP 409)
//! ├── SectionNotFound       - no active version of the starting section (surfaced, 409)
//! ├── ActionQueryFailed     - an action body's query failed (surfaced, 409)
//! ├── Unavailable           - the graph store could not be reached (surfaced, 500)
//! ├── TraversalDepthExceeded- the traversal safety ceiling was hit (surfaced, 500)
//! ├── Cancelled             - the host cancelled the request (surfaced, 499/client closed)
//! └── Model                 - malformed schema data (surfaced, 500)
//! ```
//!
//! Everything else a variable evaluation, `askWhen` predicate, or
//! `sourceNode` expression can fail with — timeouts, sandbox security
//! violations, ad hoc query errors — never becomes an `EngineError`. It is
//! recorded as a [`Warning`] on the request's `Context` and the traversal
//! continues, per the "degraded success over hard failure" policy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that escape the traversal and are surfaced to the caller.
///
/// Every other evaluator failure (timeout, sandbox denial, variable/
/// predicate query error) is recovered locally as a [`Warning`] instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request was missing `sectionId`, or omitted an input parameter
    /// the section declares.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No active version exists for the requested section id.
    #[error("section '{0}' has no active version")]
    SectionNotFound(String),

    /// A `CreatePropertyNode`/`MarkSectionComplete` action's query failed.
    ///
    /// Unlike variable/predicate query errors, this is surfaced rather than
    /// recovered: action side effects are intended to be observable, so a
    /// failed write must not be silently swallowed.
    #[error("action '{action_id}' query failed: {message}")]
    ActionQueryFailed { action_id: String, message: String },

    /// The graph store could not be reached at all (connection/driver
    /// failure, as opposed to a query-level error).
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// The traversal visited more nodes than `EngineConfig::max_traversal_
    /// steps` without reaching a terminal outcome. This is a safety
    /// backstop against a cyclic schema that never becomes answered/
    /// complete; it never changes which edge the algorithm would have
    /// selected.
    #[error("traversal exceeded {0} steps without reaching a terminal outcome")]
    TraversalDepthExceeded(usize),

    /// The host cancelled the request (e.g. a client disconnect) between
    /// two suspension points. The traversal stops at the next edge-
    /// selection boundary rather than running to completion; the partial
    /// `Context` built so far is discarded.
    #[error("request was cancelled")]
    Cancelled,

    /// The schema data returned by the graph store does not match the
    /// shape the engine expects (e.g. an action record missing its
    /// `actionType`).
    #[error("malformed schema data: {0}")]
    Model(#[from] ModelError),
}

/// Errors raised while interpreting schema data (variable/edge/action
/// definitions) independent of any particular `GraphStore` backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A variable definition declared both or neither of `cypher`/`python`,
    /// or an `askWhen`/`sourceNode` expression lacked the explicit
    /// `cypher:`/`python:` prefix required to disambiguate it.
    #[error("ambiguous expression: {0}")]
    AmbiguousExpression(String),
}

/// One recovered evaluator failure, attached to the final response.
///
/// Produced whenever a variable, `askWhen` predicate, or `sourceNode`
/// expression fails to evaluate (timeout, sandbox denial, query error) —
/// the request still completes with HTTP 200, carrying this warning
/// alongside a best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Warning {
    pub variable: String,
    pub message: String,
}

impl Warning {
    pub fn new(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            message: message.into(),
        }
    }
}

/// The outcome of an `eval()`/`run_query()` call against one of the two
/// abstract collaborators.
///
/// Modeled as a sum type per the Design Notes rather than relying on
/// exceptions/panics: callers `match` on this instead of unwinding, and a
/// buggy or hostile expression produces a typed [`EvalOutcome::Timeout`]/
/// [`EvalOutcome::Denied`] instead of taking the request down with it.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome<T> {
    /// Evaluation succeeded.
    Ok(T),
    /// The call exceeded its deadline.
    Timeout,
    /// The sandbox rejected the expression (forbidden name/import/write).
    Denied(String),
    /// The query or script raised an error of its own (syntax, runtime
    /// exception, ...).
    Err(String),
    /// The backend itself could not be reached (connection/driver
    /// failure) — only ever produced by a `GraphStore`, never by a
    /// `ScriptSandbox`.
    Unavailable(String),
}

impl<T> EvalOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EvalOutcome<U> {
        match self {
            EvalOutcome::Ok(v) => EvalOutcome::Ok(f(v)),
            EvalOutcome::Timeout => EvalOutcome::Timeout,
            EvalOutcome::Denied(m) => EvalOutcome::Denied(m),
            EvalOutcome::Err(m) => EvalOutcome::Err(m),
            EvalOutcome::Unavailable(m) => EvalOutcome::Unavailable(m),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            EvalOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// A one-line description suitable for a [`Warning::message`].
    pub fn describe_failure(&self) -> Option<String> {
        match self {
            EvalOutcome::Ok(_) => None,
            EvalOutcome::Timeout => Some("evaluation timed out".to_string()),
            EvalOutcome::Denied(m) => Some(format!("forbidden operation: {m}")),
            EvalOutcome::Err(m) => Some(m.clone()),
            EvalOutcome::Unavailable(m) => Some(format!("store unavailable: {m}")),
        }
    }
}
