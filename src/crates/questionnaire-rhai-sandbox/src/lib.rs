//! A restricted `rhai`-based [`ScriptSandbox`] for the questionnaire
//! engine's `python:` expression bodies.
//!
//! [`engine::build_engine`] assembles a curated `rhai::Engine` with no
//! filesystem/network/process capability (rhai has none to begin with) and
//! explicit ceilings on operation count, expression depth, and collection
//! size. [`sandbox::RhaiSandbox`] wraps it behind the
//! [`questionnaire_core::sandbox::ScriptSandbox`] trait, enforcing a
//! wall-clock deadline via a progress callback plus an outer async
//! timeout.

pub mod engine;
pub mod error;
pub mod sandbox;

pub use error::SandboxError;
pub use sandbox::RhaiSandbox;
