//! Declarative pipeline definition: the YAML-facing shape consumed by
//! [`crate::pipeline::factory::PipelineFactory`].
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/pipeline/pipeline_factory.py`
//! (`from_pipeline_definition_dict`, `from_config_file`) and the
//! `ExecutorInstanceConfig` shape in
//! `examples/original_source/contentflow-lib/contentflow/executors/executor_config.py`.

use crate::value::Mapping;
use serde::{Deserialize, Serialize};

/// One executor instance as it appears in a pipeline definition: a type
/// name to look up in the registry, an instance id unique within the
/// pipeline, and its raw (pre-validation) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub executor_type: String,
    #[serde(default)]
    pub settings: Mapping,
}

/// An edge between two executors, tagged by how content flows across it
/// (`spec.md` §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Edge {
    /// Single predecessor, single successor; output flows straight
    /// through.
    Sequential { from: String, to: String },
    /// One predecessor fans out its output to each of several successors.
    Parallel { from: String, to: Vec<String> },
    /// Several predecessors fan into one successor; the engine aggregates
    /// their outputs before invoking it.
    Join {
        from: Vec<String>,
        to: String,
        #[serde(default)]
        wait_strategy: WaitStrategy,
    },
    /// A predecessor routes to any number of successors, each gated by its
    /// own optional condition evaluated against its output. A target with
    /// no condition fires only when no conditioned target matches, acting
    /// as the edge's default route (`spec.md` §4.7).
    Conditional { from: String, to: Vec<ConditionalTarget> },
}

/// One destination of a [`Edge::Conditional`] edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalTarget {
    pub target: String,
    #[serde(default)]
    pub condition: Option<String>,
}

/// Informational hint about how a join edge's predecessors are expected to
/// complete; routing itself is always "wait for one arrival from each
/// distinct predecessor, then aggregate" regardless of this value
/// (`spec.md` §4.6, §9).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    #[default]
    All,
    Any,
}

/// A full declarative pipeline: its executors and the edges wiring them
/// together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub executors: Vec<ExecutorInstance>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// An alternative to `edges` for a simple linear pipeline: consecutive
    /// ids are wired sequentially. Used only when `edges` is empty, and
    /// also as the start-executor fallback when the sources-minus-targets
    /// rule finds no unique source (`spec.md` §4.6, §6).
    #[serde(default)]
    pub execution_sequence: Option<Vec<String>>,
    /// Explicit start executor override; when absent the factory derives
    /// it via the sources-minus-targets rule (`spec.md` §4.6).
    #[serde(default)]
    pub start_executor: Option<String>,
}

/// Top-level document shape accepted by `PipelineFactory::from_config_str`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfigDocument {
    pub pipelines: Vec<PipelineDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_edge_kinds_from_yaml() {
        let yaml = r#"
name: demo
executors:
  - id: a
    type: pass_through
  - id: b
    type: pass_through
  - id: c
    type: pass_through
edges:
  - kind: sequential
    from: a
    to: b
  - kind: conditional
    from: b
    to:
      - target: c
        condition: "data.kind == 'x'"
"#;
        let def: PipelineDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.executors.len(), 3);
        assert_eq!(def.edges.len(), 2);
        match &def.edges[1] {
            Edge::Conditional { to, .. } => {
                assert_eq!(to.len(), 1);
                assert_eq!(to[0].target, "c");
                assert_eq!(to[0].condition.as_deref(), Some("data.kind == 'x'"));
            }
            _ => panic!("expected conditional edge"),
        }
    }

    #[test]
    fn conditional_target_without_condition_is_a_default_route() {
        let yaml = r#"
name: demo
executors:
  - id: a
    type: pass_through
  - id: b
    type: pass_through
  - id: c
    type: pass_through
edges:
  - kind: conditional
    from: a
    to:
      - target: b
        condition: "data.kind == 'x'"
      - target: c
"#;
        let def: PipelineDefinition = serde_yaml::from_str(yaml).unwrap();
        match &def.edges[0] {
            Edge::Conditional { to, .. } => {
                assert!(to[1].condition.is_none());
            }
            _ => panic!("expected conditional edge"),
        }
    }

    #[test]
    fn execution_sequence_parses_without_edges() {
        let yaml = r#"
name: linear
executors:
  - id: a
    type: pass_through
  - id: b
    type: pass_through
execution_sequence: [a, b]
"#;
        let def: PipelineDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.edges.is_empty());
        assert_eq!(def.execution_sequence, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
