//! Input executor / crawler abstraction (`spec.md` §4.3, component C5).
//!
//! An input executor has no upstream content: it originates items by
//! crawling an external source, optionally resuming from a checkpoint
//! timestamp, and emits them in bounded batches up to a cumulative cap.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/executors/input_executor.py`
//! (`polling_interval_seconds`/`max_results`/`batch_size` settings and the
//! commented-out `crawl_all` batch-composition sketch), with the
//! per-item-stream shape modeled on the teacher's streaming node contract
//! (`NodeExecutor::is_streaming`/`finish_streaming` in
//! `examples/matbeedotcom-remotemedia-sdk/runtime/src/nodes/mod.rs`).

use crate::content::{Content, ContentIdentifier};
use crate::error::Result;
use crate::executor::{Executor, ExecutorSettings};
use crate::pipeline::engine::CancellationToken;
use crate::value::{Mapping, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha1::{Digest, Sha1};

/// One crawled record before it is wrapped into a [`Content`] item: a
/// caller-assigned canonical id, the raw field map, and the discovery
/// timestamp used to advance the checkpoint.
#[derive(Debug, Clone)]
pub struct CrawledRecord {
    pub canonical_id: String,
    pub fields: Mapping,
    pub discovered_at: DateTime<Utc>,
}

/// Source-specific crawling logic. Implementors only need to answer "give
/// me everything new since this checkpoint"; batching and the result cap
/// are handled by [`InputExecutor`] itself.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Crawl for new records since `checkpoint`, in ascending
    /// `discovered_at` order. Implementations may return more records than
    /// any one batch needs; [`InputExecutor`] applies `batch_size` and
    /// `max_results` on the combined output.
    async fn crawl(&self, checkpoint: Option<DateTime<Utc>>) -> anyhow::Result<Vec<CrawledRecord>>;
}

/// Derives the content-hash `unique_id` for a crawled record, the
/// Rust-native analog of the original's hashlib-based dedup key.
pub fn unique_id_for(canonical_id: &str, fields: &Mapping) -> String {
    let json = serde_json::to_string(fields).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(canonical_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Crawls a source, batches results, and caps cumulative output at
/// `max_results` (0 = unlimited, per `spec.md` §4.3).
pub struct InputExecutor {
    settings: ExecutorSettings,
    source: Box<dyn InputSource>,
    batch_size: usize,
    max_results: usize,
}

impl InputExecutor {
    pub fn new(id: String, raw: Mapping, source: Box<dyn InputSource>) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        let settings = ExecutorSettings::new(id, raw)?;
        let batch_size = settings.get_usize("batch_size", 50).max(1);
        let max_results = settings.get_usize("max_results", 0);
        Ok(Self {
            settings,
            source,
            batch_size,
            max_results,
        })
    }

    /// Crawl since `checkpoint`, returning batches of [`Content`] items
    /// plus the new checkpoint to persist (the max `discovered_at` seen, or
    /// the input checkpoint unchanged if nothing new was found).
    pub async fn crawl_batches(
        &self,
        checkpoint: Option<DateTime<Utc>>,
    ) -> anyhow::Result<(Vec<Vec<Content>>, Option<DateTime<Utc>>)> {
        let mut records = self.source.crawl(checkpoint).await?;
        records.sort_by_key(|r| r.discovered_at);

        if self.max_results > 0 && records.len() > self.max_results {
            records.truncate(self.max_results);
        }

        let new_checkpoint = records
            .last()
            .map(|r| r.discovered_at)
            .or(checkpoint);

        let mut batches = Vec::new();
        for chunk in records.chunks(self.batch_size) {
            let mut batch = Vec::with_capacity(chunk.len());
            for record in chunk {
                let unique_id = unique_id_for(&record.canonical_id, &record.fields);
                let mut content =
                    Content::new(ContentIdentifier::new(record.canonical_id.clone(), unique_id));
                content.data = record.fields.clone();
                batch.push(content);
            }
            batches.push(batch);
        }

        Ok((batches, new_checkpoint))
    }
}

#[async_trait]
impl Executor for InputExecutor {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Input executors ignore upstream content; they originate their own.
    /// `process_input` runs a single unbounded crawl from the start and
    /// emits everything as one list — the engine's crawler driver (not
    /// this trait method) is responsible for checkpointed, batch-by-batch
    /// invocation across pipeline runs.
    async fn process_input(
        &self,
        _input: crate::content::ContentInput,
        _cancellation: &CancellationToken,
    ) -> anyhow::Result<crate::content::ContentInput> {
        let (batches, _checkpoint) = self.crawl_batches(None).await?;
        Ok(crate::content::ContentInput::Many(
            batches.into_iter().flatten().collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedSource {
        records: Vec<CrawledRecord>,
    }

    #[async_trait]
    impl InputSource for FixedSource {
        async fn crawl(&self, checkpoint: Option<DateTime<Utc>>) -> anyhow::Result<Vec<CrawledRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| checkpoint.map(|cp| r.discovered_at > cp).unwrap_or(true))
                .cloned()
                .collect())
        }
    }

    fn record(id: &str, minute: u32) -> CrawledRecord {
        CrawledRecord {
            canonical_id: id.to_string(),
            fields: Mapping::new(),
            discovered_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let source = Box::new(FixedSource {
            records: (0..5).map(|i| record(&format!("r{i}"), i)).collect(),
        });
        let mut raw = Mapping::new();
        raw.insert("batch_size".to_string(), Value::Int(2));
        let exec = InputExecutor::new("in1".to_string(), raw, source).unwrap();
        let (batches, checkpoint) = exec.crawl_batches(None).await.unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
        assert!(checkpoint.is_some());
    }

    #[tokio::test]
    async fn max_results_zero_is_unlimited() {
        let source = Box::new(FixedSource {
            records: (0..10).map(|i| record(&format!("r{i}"), i)).collect(),
        });
        let exec = InputExecutor::new("in1".to_string(), Mapping::new(), source).unwrap();
        let (batches, _) = exec.crawl_batches(None).await.unwrap();
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn max_results_caps_cumulative_output() {
        let source = Box::new(FixedSource {
            records: (0..10).map(|i| record(&format!("r{i}"), i)).collect(),
        });
        let mut raw = Mapping::new();
        raw.insert("max_results".to_string(), Value::Int(3));
        let exec = InputExecutor::new("in1".to_string(), raw, source).unwrap();
        let (batches, _) = exec.crawl_batches(None).await.unwrap();
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn checkpoint_filters_already_seen_records() {
        let source = Box::new(FixedSource {
            records: (0..5).map(|i| record(&format!("r{i}"), i)).collect(),
        });
        let exec = InputExecutor::new("in1".to_string(), Mapping::new(), source).unwrap();
        let checkpoint = Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap();
        let (batches, new_checkpoint) = exec.crawl_batches(Some(checkpoint)).await.unwrap();
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 2);
        assert!(new_checkpoint.unwrap() > checkpoint);
    }
}
