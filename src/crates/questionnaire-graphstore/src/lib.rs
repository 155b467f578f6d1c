//! `GraphStore` implementations for the questionnaire engine.
//!
//! [`in_memory::InMemoryGraphStore`] is the reference backend: real
//! latest-active-version and edge-ordering semantics for the three
//! canonical structural statements, plus a fixture registry for ad hoc
//! statement text, used throughout this crate's and `questionnaire-core`'s
//! tests. [`neo4j::Neo4jGraphStore`] (behind the `neo4j` feature) binds the
//! same three statements to a real Neo4j connection via `neo4rs`.

pub mod error;
pub mod in_memory;
#[cfg(feature = "neo4j")]
pub mod neo4j;

pub use error::GraphStoreError;
pub use in_memory::{EdgeFixture, InMemoryGraphStore};
#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jGraphStore;
