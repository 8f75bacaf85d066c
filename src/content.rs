//! The content model: `ContentIdentifier`, `Content`, `ExecutorLogEntry`,
//! and the derived-status rule.
//!
//! Grounded in `examples/original_source/contentflow-lib/contentflow/models/_content.py`.

use crate::value::{Mapping, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a content item across the pipeline's lifetime.
///
/// `canonical_id` must be non-empty; once created, an identifier is never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIdentifier {
    /// Globally stable identifier derived from source coordinates.
    pub canonical_id: String,
    /// Content-hash derived identifier (see `input::unique_id_for`).
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: Mapping,
}

impl ContentIdentifier {
    /// Construct a new identifier. Panics in debug builds if `canonical_id`
    /// is empty, since every call site controls this value directly and an
    /// empty canonical id is always a caller bug rather than recoverable
    /// input.
    pub fn new(canonical_id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        let canonical_id = canonical_id.into();
        debug_assert!(!canonical_id.is_empty(), "canonical_id must be non-empty");
        Self {
            canonical_id,
            unique_id: unique_id.into(),
            source_name: None,
            source_type: None,
            container: None,
            path: None,
            filename: None,
            metadata: Mapping::new(),
        }
    }
}

/// The lifecycle status an [`ExecutorLogEntry`] can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Pending,
    Skipped,
    Completed,
    Failed,
}

/// One executor's record of having touched a [`Content`] item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorLogEntry {
    pub executor_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: LogStatus,
    #[serde(default)]
    pub details: Mapping,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ExecutorLogEntry {
    /// A `completed` log entry starting and ending now.
    pub fn completed(executor_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            executor_id: executor_id.into(),
            start_time: now,
            end_time: now,
            status: LogStatus::Completed,
            details: Mapping::new(),
            errors: Vec::new(),
        }
    }

    /// A `failed` log entry carrying a single error message.
    pub fn failed(executor_id: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            executor_id: executor_id.into(),
            start_time: now,
            end_time: now,
            status: LogStatus::Failed,
            details: Mapping::new(),
            errors: vec![error.into()],
        }
    }

    /// A `skipped` log entry (condition did not match, or disabled).
    pub fn skipped(executor_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            executor_id: executor_id.into(),
            start_time: now,
            end_time: now,
            status: LogStatus::Skipped,
            details: Mapping::new(),
            errors: Vec::new(),
        }
    }

    /// Attach a detail key/value, builder-style.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Content status derived from its executor logs. Never stored — always
/// recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Completed,
    Failed,
}

/// The unit of data flowing through a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentIdentifier,
    #[serde(default)]
    pub summary_data: Mapping,
    #[serde(default)]
    pub data: Mapping,
    #[serde(default)]
    pub executor_logs: Vec<ExecutorLogEntry>,
}

impl Content {
    /// Construct an empty content item around an identifier.
    pub fn new(id: ContentIdentifier) -> Self {
        Self {
            id,
            summary_data: Mapping::new(),
            data: Mapping::new(),
            executor_logs: Vec::new(),
        }
    }

    /// Derived status per `spec.md` §3: `failed` if any log entry failed;
    /// else `completed` if every entry is `completed` or `skipped`; else
    /// `pending` (including the no-logs-yet case).
    pub fn status(&self) -> ContentStatus {
        if self.executor_logs.is_empty() {
            return ContentStatus::Pending;
        }
        if self
            .executor_logs
            .iter()
            .any(|log| log.status == LogStatus::Failed)
        {
            return ContentStatus::Failed;
        }
        let all_terminal = self
            .executor_logs
            .iter()
            .all(|log| matches!(log.status, LogStatus::Completed | LogStatus::Skipped));
        if all_terminal {
            ContentStatus::Completed
        } else {
            ContentStatus::Pending
        }
    }
}

/// The input/output shape every executor must accept and may return:
/// either a single item or an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentInput {
    One(Content),
    Many(Vec<Content>),
}

impl ContentInput {
    /// Flatten into an owned `Vec`, regardless of shape.
    pub fn into_vec(self) -> Vec<Content> {
        match self {
            ContentInput::One(c) => vec![c],
            ContentInput::Many(items) => items,
        }
    }

    /// Re-wrap a processed vec back into the shape that matches the
    /// original input (single stays single, list stays list) — matches the
    /// source executor contract of preserving input cardinality on output.
    pub fn reshape(was_single: bool, mut items: Vec<Content>) -> ContentInput {
        if was_single && items.len() == 1 {
            ContentInput::One(items.remove(0))
        } else {
            ContentInput::Many(items)
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, ContentInput::One(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ContentInput::One(_) => 1,
            ContentInput::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
