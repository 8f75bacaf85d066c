//! Engine-level configuration (`SPEC_FULL.md` §10): loaded from TOML,
//! independent of any one pipeline's settings.
//!
//! Grounded in the teacher's environment-override pattern in
//! `examples/matbeedotcom-remotemedia-sdk/runtime/src/executor/runtime_selector.rs`,
//! adapted from runtime-selection overrides to engine-wide tunables.

use crate::error::Result;
use serde::{Deserialize, Serialize};

fn default_max_iterations() -> usize {
    10_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Engine-wide settings independent of any one pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduling ticks a single run may take before aborting
    /// (`Error::IterationLimitExceeded`).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Fallback per-item timeout for parallel executors that don't set
    /// their own `timeout_secs`.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Default `tracing` filter directive, overridden by `CONTENTFLOW_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_toml_is_empty() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.max_iterations, 10_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn overrides_apply_from_toml() {
        let config = EngineConfig::from_toml_str("max_iterations = 500\nlog_level = \"debug\"\n")
            .unwrap();
        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.log_level, "debug");
    }
}
