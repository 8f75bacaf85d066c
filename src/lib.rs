//! ContentFlow Engine — a declarative, DAG-based content pipeline
//! execution engine.
//!
//! Pipelines are defined as a graph of named executors wired together by
//! sequential, parallel, join, or conditional edges. A [`pipeline::PipelineFactory`]
//! compiles a [`pipeline::PipelineDefinition`] into a [`pipeline::PipelineGraph`],
//! and a [`pipeline::PipelineExecutor`] runs it, one input at a time, to
//! completion.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod condition;
pub mod config;
pub mod connector;
pub mod content;
pub mod executor;
pub mod pipeline;
pub mod value;

mod error;
pub use error::{Error, Result};

/// Initialize `tracing` for the engine.
///
/// Reads its filter directive from `CONTENTFLOW_LOG`, falling back to
/// `info`. Call once at process startup.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CONTENTFLOW_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("contentflow engine initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic() {
        let _ = init_tracing();
    }
}
