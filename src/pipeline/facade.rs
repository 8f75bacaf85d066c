//! Pipeline executor facade (`spec.md` §4.9, component C10): the
//! top-level entry point wrapping factory + engine behind `execute`/
//! `execute_stream`.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/pipeline/_pipeline_executor.py`
//! (`PipelineExecutor.execute`/`execute_stream`, lazy `initialize`, the
//! `PipelineResult`/`PipelineStatus` shapes from
//! `examples/original_source/contentflow-lib/contentflow/pipeline/_pipeline.py`).

use crate::content::ContentInput;
use crate::error::Result;
use crate::pipeline::engine::{CancellationToken, EventKind, PipelineEngine, PipelineEvent};
use crate::pipeline::factory::PipelineFactory;
use crate::pipeline::graph::PipelineGraph;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, OnceCell};

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// The result of one `execute` call.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub pipeline_name: String,
    pub status: PipelineStatus,
    pub output: Option<ContentInput>,
    pub events: Vec<PipelineEvent>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Facade over a named pipeline: builds its graph lazily on first use and
/// reuses it for every subsequent `execute`/`execute_stream` call.
pub struct PipelineExecutor {
    factory: Arc<PipelineFactory>,
    pipeline_name: String,
    graph: OnceCell<Arc<PipelineGraph>>,
}

impl PipelineExecutor {
    pub fn new(factory: Arc<PipelineFactory>, pipeline_name: impl Into<String>) -> Self {
        Self {
            factory,
            pipeline_name: pipeline_name.into(),
            graph: OnceCell::new(),
        }
    }

    /// Build the pipeline graph now rather than lazily on first `execute`.
    pub async fn initialize(&self) -> Result<()> {
        self.graph().await?;
        Ok(())
    }

    async fn graph(&self) -> Result<&Arc<PipelineGraph>> {
        self.graph
            .get_or_try_init(|| async {
                self.factory
                    .create_pipeline(&self.pipeline_name)
                    .map(Arc::new)
            })
            .await
    }

    /// Run the pipeline once, buffering all events, and return a
    /// [`PipelineResult`].
    pub async fn execute(&self, input: ContentInput) -> Result<PipelineResult> {
        let start_time = Utc::now();
        let graph = self.graph().await?.clone();
        let engine = PipelineEngine::new(graph);

        match engine.run(input).await {
            Ok(run_result) => {
                let status = if run_result
                    .events
                    .iter()
                    .any(|e| e.kind == EventKind::Failed)
                {
                    PipelineStatus::Failed
                } else {
                    PipelineStatus::Completed
                };
                Ok(PipelineResult {
                    pipeline_name: self.pipeline_name.clone(),
                    status,
                    output: Some(run_result.output),
                    events: run_result.events,
                    start_time,
                    end_time: Utc::now(),
                    error: None,
                })
            }
            Err(err) => {
                let status = if matches!(err, crate::error::Error::Cancelled) {
                    PipelineStatus::Cancelled
                } else {
                    PipelineStatus::Failed
                };
                Ok(PipelineResult {
                    pipeline_name: self.pipeline_name.clone(),
                    status,
                    output: None,
                    events: Vec::new(),
                    start_time,
                    end_time: Utc::now(),
                    error: Some(err.to_string()),
                })
            }
        }
    }

    /// Run the pipeline, streaming each [`PipelineEvent`] to the caller as
    /// it happens instead of buffering. Returns the receiving end of the
    /// channel the caller drains; the run's final `Result` arrives as the
    /// join handle's output once the channel closes.
    pub fn execute_stream(
        &self,
        input: ContentInput,
    ) -> (
        mpsc::Receiver<PipelineEvent>,
        CancellationToken,
        tokio::task::JoinHandle<Result<ContentInput>>,
    ) {
        let (tx, rx) = mpsc::channel(256);
        let cancellation = CancellationToken::new();
        let factory = Arc::clone(&self.factory);
        let pipeline_name = self.pipeline_name.clone();
        let cancellation_for_task = cancellation.clone();

        let handle = tokio::spawn(async move {
            let graph = Arc::new(factory.create_pipeline(&pipeline_name)?);
            let engine = PipelineEngine::new(graph);
            engine.run_stream(input, tx, cancellation_for_task).await
        });

        (rx, cancellation, handle)
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, ContentIdentifier};
    use crate::executor::builtin::PassThroughExecutor;
    use crate::executor::registry::{ExecutorCatalogEntry, ExecutorRegistry};
    use indexmap::IndexMap;

    fn factory() -> Arc<PipelineFactory> {
        let mut registry = ExecutorRegistry::new();
        registry.register(
            ExecutorCatalogEntry {
                id: "pass_through".to_string(),
                name: "Pass Through".to_string(),
                description: String::new(),
                module_path: String::new(),
                class_name: String::new(),
                category: "test".to_string(),
                tags: vec![],
                version: "1.0".to_string(),
                settings_schema: IndexMap::new(),
            },
            |id, settings| Ok(Box::new(PassThroughExecutor::new(id, settings)?)),
        );
        let mut factory = PipelineFactory::new(Arc::new(registry));
        factory
            .load_definitions_yaml(
                r#"
pipelines:
  - name: demo
    executors:
      - id: a
        type: pass_through
    edges: []
"#,
            )
            .unwrap();
        Arc::new(factory)
    }

    #[tokio::test]
    async fn execute_returns_completed_result() {
        let executor = PipelineExecutor::new(factory(), "demo");
        let content = Content::new(ContentIdentifier::new("x", "hash"));
        let result = executor.execute(ContentInput::One(content)).await.unwrap();
        assert_eq!(result.status, PipelineStatus::Completed);
        assert!(result.output.is_some());
        assert!(result.duration_seconds() >= 0.0);
    }

    #[tokio::test]
    async fn execute_on_unknown_pipeline_is_config_error() {
        let executor = PipelineExecutor::new(factory(), "missing");
        let content = Content::new(ContentIdentifier::new("x", "hash"));
        let result = executor.execute(ContentInput::One(content)).await;
        assert!(result.is_err());
    }
}
