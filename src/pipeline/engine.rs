//! Pipeline run engine (`spec.md` §4.7, component C9): drives a compiled
//! [`PipelineGraph`] to completion for one input.
//!
//! Grounded in the mailbox/event shape of
//! `examples/original_source/contentflow-lib/contentflow/pipeline/_pipeline_executor.py::execute`/`execute_stream`,
//! but scheduling is newly designed for Rust: rather than one `asyncio`
//! task per executor, each executor owns a single FIFO mailbox
//! (`VecDeque`) polled by one scheduling loop, which guarantees at most
//! one in-flight invocation per executor by construction rather than by
//! locking. Streaming uses `tokio::sync::mpsc`, matching the teacher's use
//! of channels to bridge a synchronous loop to an async stream
//! (`examples/matbeedotcom-remotemedia-sdk/runtime/src/executor/graph.rs`).

use crate::condition::SecureConditionEvaluator;
use crate::content::{Content, ContentInput};
use crate::error::{Error, Result};
use crate::executor::fan_in::merge_content_batches;
use crate::pipeline::definition::ConditionalTarget;
use crate::pipeline::graph::{PipelineGraph, Routing};
use crate::value::Value;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The kind of thing that happened during a run, mirroring the original's
/// `PipelineEvent` (`event_type`/`executor_id`/`data`/`error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Started,
    ExecutorStarted,
    ExecutorCompleted,
    ExecutorSkipped,
    ExecutorFailed,
    Output,
    Completed,
    Failed,
    Cancelled,
}

/// One notable occurrence during a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub executor_id: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl PipelineEvent {
    fn new(kind: EventKind, executor_id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            executor_id,
            data: None,
            error: None,
        }
    }
}

/// The terminal result of a completed `run` invocation.
pub struct RunResult {
    pub output: ContentInput,
    pub events: Vec<PipelineEvent>,
}

/// A cooperative cancellation flag shared between a caller and a running
/// engine; checked once per scheduling tick.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Maximum scheduling ticks before a run is aborted as non-terminating
/// (`spec.md` §9: bounds a single engine tick per mailbox drain, not wall
/// clock time).
const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Drives one [`PipelineGraph`] for one input to completion.
pub struct PipelineEngine {
    graph: Arc<PipelineGraph>,
    evaluator: SecureConditionEvaluator,
    max_iterations: usize,
}

impl PipelineEngine {
    pub fn new(graph: Arc<PipelineGraph>) -> Self {
        Self {
            graph,
            evaluator: SecureConditionEvaluator::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run to completion, buffering every event, and return the final
    /// output plus the full event log.
    pub async fn run(&self, input: ContentInput) -> Result<RunResult> {
        self.run_with(input, None, None).await
    }

    /// Run to completion, buffering every event, observing `cancellation`.
    /// Used by [`crate::executor::subpipeline::SubPipelineExecutor`] so a
    /// cancellation requested on the outer run also reaches a nested one.
    pub async fn run_cancellable(
        &self,
        input: ContentInput,
        cancellation: CancellationToken,
    ) -> Result<RunResult> {
        self.run_with(input, None, Some(cancellation)).await
    }

    /// Run to completion, emitting each [`PipelineEvent`] over `events` as
    /// it happens rather than buffering.
    pub async fn run_stream(
        &self,
        input: ContentInput,
        events: mpsc::Sender<PipelineEvent>,
        cancellation: CancellationToken,
    ) -> Result<ContentInput> {
        let result = self
            .run_with(input, Some(events), Some(cancellation))
            .await?;
        Ok(result.output)
    }

    async fn run_with(
        &self,
        input: ContentInput,
        sink: Option<mpsc::Sender<PipelineEvent>>,
        cancellation: Option<CancellationToken>,
    ) -> Result<RunResult> {
        let cancellation = cancellation.unwrap_or_default();
        let mut events = Vec::new();
        let mut emit = |event: PipelineEvent| {
            if let Some(sink) = &sink {
                let _ = sink.try_send(event.clone());
            }
            events.push(event);
        };

        emit(PipelineEvent::new(EventKind::Started, None));

        let mut mailboxes: IndexMap<String, VecDeque<ContentInput>> =
            self.graph.nodes.keys().map(|id| (id.clone(), VecDeque::new())).collect();
        let mut join_buffers: IndexMap<String, IndexMap<String, VecDeque<ContentInput>>> =
            IndexMap::new();
        let mut outputs: Vec<Content> = Vec::new();

        mailboxes
            .get_mut(&self.graph.start)
            .expect("start executor is validated at graph construction")
            .push_back(input);

        let mut iterations = 0usize;
        loop {
            if cancellation.is_cancelled() {
                emit(PipelineEvent::new(EventKind::Cancelled, None));
                return Err(Error::Cancelled);
            }

            let next_id = mailboxes
                .iter()
                .find(|(_, queue)| !queue.is_empty())
                .map(|(id, _)| id.clone());

            let Some(id) = next_id else { break };

            if iterations >= self.max_iterations {
                return Err(Error::IterationLimitExceeded {
                    max_iterations: self.max_iterations,
                });
            }
            iterations += 1;

            let input = mailboxes
                .get_mut(&id)
                .expect("id came from mailboxes keys")
                .pop_front()
                .expect("checked non-empty above");

            let executor = self
                .graph
                .nodes
                .get(&id)
                .expect("mailbox ids are graph node ids");

            emit(PipelineEvent::new(
                EventKind::ExecutorStarted,
                Some(id.clone()),
            ));

            let outcome = match executor.handle_input(input, &self.evaluator, &cancellation).await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    emit(PipelineEvent {
                        error: Some(err.to_string()),
                        ..PipelineEvent::new(EventKind::ExecutorFailed, Some(id.clone()))
                    });
                    emit(PipelineEvent::new(EventKind::Failed, None));
                    return Err(err);
                }
            };

            for nested in executor.take_direct_output_events() {
                emit(nested);
            }

            emit(PipelineEvent {
                error: outcome.error.clone(),
                ..PipelineEvent::new(
                    if outcome.error.is_some() {
                        EventKind::ExecutorFailed
                    } else if outcome.passed_through {
                        EventKind::ExecutorSkipped
                    } else {
                        EventKind::ExecutorCompleted
                    },
                    Some(id.clone()),
                )
            });

            match self.graph.routing_for(&id) {
                Routing::Terminal => {
                    outputs.extend(outcome.output.into_vec());
                }
                Routing::Sequential(to) => {
                    self.deliver(&id, &to, outcome.output, &mut mailboxes, &mut join_buffers);
                }
                Routing::Parallel(targets) => {
                    for to in targets {
                        self.deliver(
                            &id,
                            &to,
                            outcome.output.clone(),
                            &mut mailboxes,
                            &mut join_buffers,
                        );
                    }
                }
                Routing::Conditional { targets } => {
                    self.route_conditional(&id, &targets, outcome.output, &mut mailboxes, &mut join_buffers)?;
                }
            }

            self.drain_ready_joins(&mut join_buffers, &mut mailboxes);
        }

        emit(PipelineEvent::new(EventKind::Output, None));
        emit(PipelineEvent::new(EventKind::Completed, None));

        let output = ContentInput::reshape(outputs.len() == 1, outputs);
        Ok(RunResult { output, events })
    }

    /// Evaluate each conditional target's condition against every item in
    /// `output`, per item: deliver to every target whose condition holds,
    /// and to every unconditioned target only for items no conditioned
    /// target matched (the edge's default route, `spec.md` §4.7).
    fn route_conditional(
        &self,
        from: &str,
        targets: &[ConditionalTarget],
        output: ContentInput,
        mailboxes: &mut IndexMap<String, VecDeque<ContentInput>>,
        join_buffers: &mut IndexMap<String, IndexMap<String, VecDeque<ContentInput>>>,
    ) -> Result<()> {
        let mut per_target: IndexMap<&str, Vec<Content>> =
            targets.iter().map(|t| (t.target.as_str(), Vec::new())).collect();

        for item in output.into_vec() {
            let mut matched_conditioned = false;
            for target in targets {
                if let Some(condition) = &target.condition {
                    if self.evaluator.evaluate(condition, &item)? {
                        matched_conditioned = true;
                        per_target.get_mut(target.target.as_str()).unwrap().push(item.clone());
                    }
                }
            }
            if !matched_conditioned {
                for target in targets {
                    if target.condition.is_none() {
                        per_target.get_mut(target.target.as_str()).unwrap().push(item.clone());
                    }
                }
            }
        }

        for (to, items) in per_target {
            if !items.is_empty() {
                self.deliver(from, to, ContentInput::Many(items), mailboxes, join_buffers);
            }
        }
        Ok(())
    }

    /// Send `output`, produced by `from`, toward `to`. If `to` is a join
    /// target, buffer it per-predecessor instead of delivering directly;
    /// [`Self::drain_ready_joins`] promotes it once every predecessor has
    /// contributed.
    fn deliver(
        &self,
        from: &str,
        to: &str,
        output: ContentInput,
        mailboxes: &mut IndexMap<String, VecDeque<ContentInput>>,
        join_buffers: &mut IndexMap<String, IndexMap<String, VecDeque<ContentInput>>>,
    ) {
        if self.graph.join_edge_for(to).is_some() {
            join_buffers
                .entry(to.to_string())
                .or_default()
                .entry(from.to_string())
                .or_default()
                .push_back(output);
        } else if let Some(queue) = mailboxes.get_mut(to) {
            queue.push_back(output);
        }
    }

    /// Pairs join-edge predecessor arrivals strictly by arrival order: the
    /// Nth item from each predecessor forms the Nth merge group (resolves
    /// the join-pairing open question per `spec.md` §9).
    fn drain_ready_joins(
        &self,
        join_buffers: &mut IndexMap<String, IndexMap<String, VecDeque<ContentInput>>>,
        mailboxes: &mut IndexMap<String, VecDeque<ContentInput>>,
    ) {
        for (to, predecessors) in join_buffers.iter_mut() {
            let Some((expected, _)) = self.graph.join_edge_for(to) else {
                continue;
            };
            loop {
                let all_ready = expected
                    .iter()
                    .all(|p| predecessors.get(p).map(|q| !q.is_empty()).unwrap_or(false));
                if !all_ready {
                    break;
                }
                let batches: Vec<Vec<Content>> = expected
                    .iter()
                    .map(|p| {
                        predecessors
                            .get_mut(p)
                            .and_then(|q| q.pop_front())
                            .map(ContentInput::into_vec)
                            .unwrap_or_default()
                    })
                    .collect();
                let merged = merge_content_batches(batches);
                if let Some(queue) = mailboxes.get_mut(to) {
                    queue.push_back(ContentInput::Many(merged));
                }
            }
        }
    }
}
