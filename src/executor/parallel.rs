//! Parallel per-item executor (`spec.md` §4.2, component C4).
//!
//! Wraps an inner [`Executor`] and fans a list input out across bounded
//! concurrent invocations, one per item, preserving input order in the
//! output regardless of completion order.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/executors/parallel_executor.py`
//! (`max_concurrent`/`timeout_seconds`/`continue_on_error` settings,
//! semaphore-bounded `asyncio.gather`), realized with
//! `tokio::sync::Semaphore` and `tokio::time::timeout` the way the teacher
//! bounds concurrent node invocations in
//! `examples/matbeedotcom-remotemedia-sdk/runtime/src/executor/graph.rs`.

use crate::content::{Content, ContentInput, ExecutorLogEntry};
use crate::error::Result;
use crate::executor::{Executor, ExecutorSettings};
use crate::pipeline::engine::CancellationToken;
use crate::value::{Mapping, Value};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-item invocation outcome, before being folded back into order.
enum ItemResult {
    Ok(Content),
    Failed(Content, String),
}

/// Runs `inner.process_input` once per item of a list input, with bounded
/// concurrency and a per-item timeout.
pub struct ParallelExecutor {
    settings: ExecutorSettings,
    inner: Arc<dyn Executor>,
    max_concurrent: usize,
    timeout: Duration,
    continue_on_error: bool,
}

impl ParallelExecutor {
    pub fn new(id: String, raw: Mapping, inner: Arc<dyn Executor>) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        let settings = ExecutorSettings::new(id, raw)?;
        let max_concurrent = settings.get_usize("max_concurrent", 5);
        let timeout_secs = settings.get_u64("timeout_secs", 300);
        let continue_on_error = settings.get_bool("continue_on_error", true);
        Ok(Self {
            settings,
            inner,
            max_concurrent: max_concurrent.max(1),
            timeout: Duration::from_secs(timeout_secs),
            continue_on_error,
        })
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
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
        let was_single = input.is_single();
        let items = input.into_vec();
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let mut handles = Vec::with_capacity(total);
        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let inner = Arc::clone(&self.inner);
            let timeout = self.timeout;
            let executor_id = self.settings.id.clone();
            let cancellation = cancellation.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                if cancellation.is_cancelled() {
                    return ItemResult::Failed(item, "cancelled".to_string());
                }
                let single = ContentInput::One(item.clone());
                match tokio::time::timeout(timeout, inner.process_input(single, &cancellation))
                    .await
                {
                    Ok(Ok(output)) => {
                        let mut out_items = output.into_vec();
                        let mut result_item = out_items.pop().unwrap_or(item);
                        result_item
                            .executor_logs
                            .push(ExecutorLogEntry::completed(&executor_id));
                        ItemResult::Ok(result_item)
                    }
                    Ok(Err(err)) => ItemResult::Failed(item, err.to_string()),
                    Err(_) => ItemResult::Failed(item, format!("timed out after {timeout:?}")),
                }
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| anyhow::anyhow!("parallel task panicked: {e}"))?;
            results.push(result);
        }

        let mut output = Vec::with_capacity(total);
        for result in results {
            match result {
                ItemResult::Ok(item) => output.push(item),
                ItemResult::Failed(mut item, message) => {
                    item.executor_logs
                        .push(ExecutorLogEntry::failed(&self.settings.id, &message));
                    if self.continue_on_error {
                        output.push(item);
                    } else {
                        return Err(anyhow::anyhow!(
                            "item '{}' failed: {message}",
                            item.id.canonical_id
                        ));
                    }
                }
            }
        }

        Ok(ContentInput::reshape(was_single, output))
    }
}
