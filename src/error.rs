//! Error types for the ContentFlow pipeline execution engine.

use thiserror::Error;

/// Result type alias for ContentFlow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while building or running a pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog/definition problem: unknown executor type, bad settings schema,
    /// missing required setting, unresolved environment variable. Raised before
    /// a run starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// Condition string failed the security pre-check, failed to parse, or
    /// failed to evaluate (e.g. an invalid regex in `regex_match`).
    #[error("condition error: {0}")]
    Condition(String),

    /// A concrete executor's `process_input` raised.
    #[error("executor '{executor_id}' failed: {source}")]
    Executor {
        /// Identifier of the executor instance that failed.
        executor_id: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },

    /// An item timed out inside a parallel executor.
    #[error("executor '{executor_id}' timed out after {secs}s")]
    Timeout {
        /// Identifier of the executor instance that timed out.
        executor_id: String,
        /// Configured timeout, in seconds.
        secs: u64,
    },

    /// The scheduling loop exceeded `max_iterations` without quiescing.
    #[error("pipeline exceeded max_iterations ({max_iterations})")]
    IterationLimitExceeded {
        /// The configured iteration ceiling.
        max_iterations: usize,
    },

    /// The run was cancelled externally.
    #[error("pipeline run was cancelled")]
    Cancelled,

    /// I/O error (catalog/definition file loading, crawler I/O).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML (de)serialization error for engine configuration.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for errors that represent a single failed item rather than a
    /// structural problem with the pipeline definition itself.
    pub fn is_executor_local(&self) -> bool {
        matches!(self, Error::Executor { .. } | Error::Timeout { .. })
    }

    /// The executor instance id associated with this error, if any.
    pub fn executor_id(&self) -> Option<&str> {
        match self {
            Error::Executor { executor_id, .. } => Some(executor_id),
            Error::Timeout { executor_id, .. } => Some(executor_id),
            _ => None,
        }
    }

    /// Build an [`Error::Executor`] from any error implementing `std::error::Error`.
    pub fn executor(executor_id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::Executor {
            executor_id: executor_id.into(),
            source: source.into(),
        }
    }
}
