//! Declarative DAG pipelines: definitions, compiled graphs, the run
//! engine, the pipeline factory, and the executor facade.

pub mod definition;
pub mod engine;
pub mod facade;
pub mod factory;
pub mod graph;

pub use definition::{
    ConditionalTarget, Edge, ExecutorInstance, PipelineConfigDocument, PipelineDefinition,
    WaitStrategy,
};
pub use engine::{CancellationToken, EventKind, PipelineEngine, PipelineEvent, RunResult};
pub use facade::{PipelineExecutor, PipelineResult, PipelineStatus};
pub use factory::PipelineFactory;
pub use graph::{PipelineGraph, Routing};
