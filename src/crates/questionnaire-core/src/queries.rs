//! Canonical, engine-authored structural statements.
//!
//! These three templates are the only queries the traversal algorithm
//! itself issues; everything else the engine sends to a `GraphStore` is an
//! ad hoc, schema-authored body (variable/predicate/source-node/action
//! text). A real backend can pattern-match these constants and execute them
//! with dedicated, efficient query plans instead of treating them as
//! opaque text; `InMemoryGraphStore` recognizes them by identity and
//! implements them with true in-memory graph semantics.

/// Resolve the latest active version of a node by its external id.
///
/// Params: `id` (string). Returns at most one record with columns `id`,
/// `labels`, `properties`, `versionNumber`.
pub const LATEST_ACTIVE_NODE: &str = "questionnaire.latest_active_node";

/// Enumerate the outgoing `PRECEDES`/`TRIGGERS` edges of a resolved node,
/// each already targeting its own latest-active version.
///
/// Params: `id` (string). Returns records with columns `kind`, `to`,
/// `orderInForm`, `askWhen`, `sourceNode`, `variables`, `createdAt`, already
/// sorted ascending by `orderInForm` then `createdAt`.
pub const OUTGOING_EDGES: &str = "questionnaire.outgoing_edges";

/// Check whether a question has already been answered by a given source
/// node, via the `ANSWERS`/`SUPPLIES` relationship pair.
///
/// Params: `question_id` (string), `source_node_id` (string). A non-empty
/// result means "answered"; the record shape beyond row presence is
/// unspecified.
pub const ANSWERED_CHECK: &str = "questionnaire.answered_check";
