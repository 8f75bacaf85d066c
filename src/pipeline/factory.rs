//! Pipeline factory (`spec.md` §4.6, component C8): turns a declarative
//! [`PipelineDefinition`] into a compiled [`PipelineGraph`].
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/pipeline/pipeline_factory.py`:
//! `_create_executors` (including the `sub-pipeline` type's
//! `WorkflowExecutor` wrapping), `_build_pipeline_from_edges`, and
//! `_determine_start_executor` (ported into
//! `crate::pipeline::graph::PipelineGraph::new`).

use crate::error::{Error, Result};
use crate::executor::registry::ExecutorRegistry;
use crate::executor::subpipeline::SubPipelineExecutor;
use crate::executor::Executor;
use crate::pipeline::definition::{Edge, PipelineConfigDocument, PipelineDefinition};
use crate::pipeline::graph::PipelineGraph;
use indexmap::IndexMap;
use std::sync::Arc;

/// The `type` value in [`crate::pipeline::definition::ExecutorInstance`]
/// that marks an embedded sub-pipeline rather than a registry lookup.
pub const SUB_PIPELINE_TYPE: &str = "sub-pipeline";

/// Builds [`PipelineGraph`]s from [`PipelineDefinition`]s, resolving each
/// executor instance against an [`ExecutorRegistry`] (or, for
/// `sub-pipeline` instances, recursively building the nested pipeline by
/// name from the same catalog of definitions).
pub struct PipelineFactory {
    registry: Arc<ExecutorRegistry>,
    definitions: IndexMap<String, PipelineDefinition>,
}

impl PipelineFactory {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            definitions: IndexMap::new(),
        }
    }

    /// Parse a YAML document of pipeline definitions and register them by
    /// name, so `sub-pipeline` executors can reference them.
    pub fn load_definitions_yaml(&mut self, yaml: &str) -> Result<()> {
        let doc: PipelineConfigDocument = serde_yaml::from_str(yaml)?;
        for def in doc.pipelines {
            self.definitions.insert(def.name.clone(), def);
        }
        Ok(())
    }

    pub fn register_definition(&mut self, definition: PipelineDefinition) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    /// Build the named pipeline's graph, recursively resolving any
    /// `sub-pipeline` executor instances it contains.
    pub fn create_pipeline(&self, name: &str) -> Result<PipelineGraph> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown pipeline '{name}'")))?;
        self.build_graph(definition)
    }

    /// Build a graph directly from a definition not registered by name
    /// (e.g. one loaded ad hoc by a caller).
    pub fn build_graph(&self, definition: &PipelineDefinition) -> Result<PipelineGraph> {
        let mut nodes: IndexMap<String, Arc<dyn Executor>> = IndexMap::new();

        for instance in &definition.executors {
            let executor: Arc<dyn Executor> = if instance.executor_type == SUB_PIPELINE_TYPE {
                self.create_subpipeline_executor(instance)?
            } else {
                Arc::from(self.registry.create_instance(
                    &instance.executor_type,
                    instance.id.clone(),
                    &instance.settings,
                )?)
            };
            if nodes.insert(instance.id.clone(), executor).is_some() {
                return Err(Error::Config(format!(
                    "duplicate executor id '{}' in pipeline '{}'",
                    instance.id, definition.name
                )));
            }
        }

        let edges = if definition.edges.is_empty() {
            synthesize_sequential_edges(definition.execution_sequence.as_deref())
        } else {
            definition.edges.clone()
        };

        self.validate_join_targets(&edges)?;

        PipelineGraph::new(
            definition.name.clone(),
            nodes,
            edges,
            definition.start_executor.clone(),
            definition
                .execution_sequence
                .as_ref()
                .and_then(|seq| seq.first().cloned()),
        )
    }

    fn create_subpipeline_executor(
        &self,
        instance: &crate::pipeline::definition::ExecutorInstance,
    ) -> Result<Arc<dyn Executor>> {
        let nested_name = match instance.settings.get("pipeline") {
            Some(crate::value::Value::String(s)) => s.clone(),
            _ => {
                return Err(Error::Config(format!(
                    "sub-pipeline executor '{}' requires a string 'pipeline' setting",
                    instance.id
                )))
            }
        };
        let nested_graph = Arc::new(self.create_pipeline(&nested_name)?);
        let exec = SubPipelineExecutor::new(
            instance.id.clone(),
            instance.settings.clone(),
            nested_graph,
        )?;
        Ok(Arc::new(exec))
    }

    /// A node may be the target of at most one join edge (enforced here
    /// since `PipelineGraph::join_edge_for` returns only the first match).
    fn validate_join_targets(&self, edges: &[crate::pipeline::definition::Edge]) -> Result<()> {
        use crate::pipeline::definition::Edge;
        let mut seen = std::collections::HashSet::new();
        for edge in edges {
            if let Edge::Join { to, .. } = edge {
                if !seen.insert(to.clone()) {
                    return Err(Error::Config(format!(
                        "executor '{to}' is the target of more than one join edge"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Wires consecutive ids of `execution_sequence` into sequential edges, the
/// alternative to an explicit `edges` list for a simple linear pipeline
/// (`spec.md` §4.6, §6). `None` or a single-element sequence yields no
/// edges, leaving the lone executor as both start and terminal.
fn synthesize_sequential_edges(execution_sequence: Option<&[String]>) -> Vec<Edge> {
    let Some(sequence) = execution_sequence else {
        return Vec::new();
    };
    sequence
        .windows(2)
        .map(|pair| Edge::Sequential {
            from: pair[0].clone(),
            to: pair[1].clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::builtin::PassThroughExecutor;
    use crate::executor::registry::ExecutorCatalogEntry;

    fn registry_with_pass_through() -> Arc<ExecutorRegistry> {
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
        Arc::new(registry)
    }

    #[test]
    fn builds_sequential_graph_from_yaml() {
        let yaml = r#"
pipelines:
  - name: demo
    executors:
      - id: a
        type: pass_through
      - id: b
        type: pass_through
    edges:
      - kind: sequential
        from: a
        to: b
"#;
        let mut factory = PipelineFactory::new(registry_with_pass_through());
        factory.load_definitions_yaml(yaml).unwrap();
        let graph = factory.create_pipeline("demo").unwrap();
        assert_eq!(graph.start, "a");
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn rejects_duplicate_join_targets() {
        let yaml = r#"
pipelines:
  - name: demo
    executors:
      - id: a
        type: pass_through
      - id: b
        type: pass_through
      - id: c
        type: pass_through
      - id: join
        type: pass_through
    edges:
      - kind: join
        from: [a, b]
        to: join
      - kind: join
        from: [c]
        to: join
"#;
        let mut factory = PipelineFactory::new(registry_with_pass_through());
        factory.load_definitions_yaml(yaml).unwrap();
        assert!(factory.create_pipeline("demo").is_err());
    }

    #[test]
    fn builds_sequential_graph_from_execution_sequence() {
        let yaml = r#"
pipelines:
  - name: demo
    executors:
      - id: a
        type: pass_through
      - id: b
        type: pass_through
      - id: c
        type: pass_through
    execution_sequence: [a, b, c]
"#;
        let mut factory = PipelineFactory::new(registry_with_pass_through());
        factory.load_definitions_yaml(yaml).unwrap();
        let graph = factory.create_pipeline("demo").unwrap();
        assert_eq!(graph.start, "a");
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn unknown_pipeline_name_is_config_error() {
        let factory = PipelineFactory::new(registry_with_pass_through());
        assert!(factory.create_pipeline("nope").is_err());
    }
}
