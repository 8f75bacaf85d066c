//! Sub-pipeline executor (`spec.md` §4.6/§4.8): wraps a nested pipeline
//! graph so it can be embedded as a single node in a parent graph.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/pipeline/pipeline_factory.py::_create_subworkflow`
//! (the `type == 'sub-pipeline'` branch wrapping a nested graph in a
//! `WorkflowExecutor` with an `allow_direct_output` flag).

use crate::content::ContentInput;
use crate::error::Result;
use crate::executor::{Executor, ExecutorSettings};
use crate::pipeline::engine::{CancellationToken, PipelineEngine, PipelineEvent};
use crate::pipeline::graph::PipelineGraph;
use crate::value::{Mapping, Value};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};

/// Runs `graph` to completion for each invocation and returns its final
/// output. `allow_direct_output` controls whether the nested run's
/// intermediate events are surfaced to the parent run's event stream or
/// only its terminal output (`spec.md` §4.6).
pub struct SubPipelineExecutor {
    settings: ExecutorSettings,
    graph: Arc<PipelineGraph>,
    allow_direct_output: bool,
    pending_events: Mutex<Vec<PipelineEvent>>,
}

impl SubPipelineExecutor {
    pub fn new(id: String, raw: Mapping, graph: Arc<PipelineGraph>) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        let settings = ExecutorSettings::new(id, raw)?;
        let allow_direct_output = settings.get_bool("allow_direct_output", false);
        Ok(Self {
            settings,
            graph,
            allow_direct_output,
            pending_events: Mutex::new(Vec::new()),
        })
    }

    pub fn allow_direct_output(&self) -> bool {
        self.allow_direct_output
    }
}

#[async_trait]
impl Executor for SubPipelineExecutor {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    async fn process_input(
        &self,
        input: ContentInput,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<ContentInput> {
        let engine = PipelineEngine::new(Arc::clone(&self.graph));
        let result = engine.run_cancellable(input, cancellation.clone()).await?;
        if self.allow_direct_output {
            self.pending_events
                .lock()
                .expect("pending_events mutex is never poisoned")
                .extend(result.events);
        }
        Ok(result.output)
    }

    fn take_direct_output_events(&self) -> Vec<PipelineEvent> {
        std::mem::take(
            &mut *self
                .pending_events
                .lock()
                .expect("pending_events mutex is never poisoned"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, ContentIdentifier};
    use crate::executor::builtin::PassThroughExecutor;
    use crate::pipeline::definition::Edge;

    fn nested_graph() -> Arc<PipelineGraph> {
        let mut nodes: IndexMap<String, Arc<dyn Executor>> = IndexMap::new();
        nodes.insert(
            "x".to_string(),
            Arc::new(PassThroughExecutor::new("x".to_string(), Mapping::new()).unwrap()),
        );
        nodes.insert(
            "y".to_string(),
            Arc::new(PassThroughExecutor::new("y".to_string(), Mapping::new()).unwrap()),
        );
        let edges = vec![Edge::Sequential {
            from: "x".to_string(),
            to: "y".to_string(),
        }];
        Arc::new(PipelineGraph::new("nested".to_string(), nodes, edges, None, None).unwrap())
    }

    fn content() -> ContentInput {
        ContentInput::One(Content::new(ContentIdentifier::new("a", "hash-a")))
    }

    #[tokio::test]
    async fn direct_output_disabled_surfaces_no_nested_events() {
        let exec =
            SubPipelineExecutor::new("s".to_string(), Mapping::new(), nested_graph()).unwrap();
        exec.process_input(content(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(exec.take_direct_output_events().is_empty());
    }

    #[tokio::test]
    async fn direct_output_enabled_surfaces_nested_events() {
        let mut raw = Mapping::new();
        raw.insert("allow_direct_output".to_string(), Value::Bool(true));
        let exec = SubPipelineExecutor::new("s".to_string(), raw, nested_graph()).unwrap();
        exec.process_input(content(), &CancellationToken::new())
            .await
            .unwrap();
        let events = exec.take_direct_output_events();
        assert!(!events.is_empty());
        assert!(exec.take_direct_output_events().is_empty());
    }
}
