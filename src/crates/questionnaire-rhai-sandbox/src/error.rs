//! Errors a sandboxed evaluation can raise before they are flattened into
//! [`questionnaire_core::error::EvalOutcome`].

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// The expression ran past its allotted wall-clock budget.
    #[error("script evaluation timed out")]
    Timeout,

    /// The expression was rejected before or during evaluation by a
    /// whitelist guard (a disallowed name, an operation-count ceiling, a
    /// nesting-depth ceiling, or an oversized intermediate string).
    #[error("script rejected by sandbox policy: {0}")]
    Denied(String),

    /// `rhai` itself reported a parse or runtime error.
    #[error("script evaluation failed: {0}")]
    Eval(String),
}
