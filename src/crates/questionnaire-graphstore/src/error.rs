//! Errors a concrete `GraphStore` implementation can raise, classified the
//! same way the core's `EvalOutcome` expects: timeout, query error, or
//! connection-level unavailability.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphStoreError {
    /// The statement's text did not match any recognized canonical
    /// template and no ad hoc fixture was registered for it.
    #[error("no result registered for statement: {0}")]
    UnregisteredStatement(String),

    /// A canonical statement was issued with a parameter the store could
    /// not interpret (e.g. a non-string `id`).
    #[error("malformed query parameters: {0}")]
    MalformedParams(String),

    /// The underlying driver reported a syntactic or semantic failure.
    #[error("query failed: {0}")]
    Query(String),

    /// The store could not be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
