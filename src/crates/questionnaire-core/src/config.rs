//! `EngineConfig`: the tunables the traversal core needs from its host.
//!
//! The host process owns reading environment variables or config files;
//! this crate only ever receives an already-constructed `EngineConfig`,
//! keeping retry/timeout policy a plain data value rather than something
//! this crate resolves from the environment itself.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    row_cap: usize,
    variable_timeout_ms: u64,
    expr_timeout_ms: u64,
    max_traversal_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_cap: 100,
            variable_timeout_ms: 500,
            expr_timeout_ms: 1500,
            max_traversal_steps: 500,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    pub fn variable_timeout(&self) -> Duration {
        Duration::from_millis(self.variable_timeout_ms)
    }

    pub fn expr_timeout(&self) -> Duration {
        Duration::from_millis(self.expr_timeout_ms)
    }

    pub fn max_traversal_steps(&self) -> usize {
        self.max_traversal_steps
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn row_cap(mut self, row_cap: usize) -> Self {
        self.inner.row_cap = row_cap;
        self
    }

    pub fn variable_timeout_ms(mut self, ms: u64) -> Self {
        self.inner.variable_timeout_ms = ms;
        self
    }

    pub fn expr_timeout_ms(mut self, ms: u64) -> Self {
        self.inner.expr_timeout_ms = ms;
        self
    }

    pub fn max_traversal_steps(mut self, steps: usize) -> Self {
        self.inner.max_traversal_steps = steps;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.inner
    }
}
