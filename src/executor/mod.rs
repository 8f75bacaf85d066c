//! Executor base protocol (`spec.md` §4.1).
//!
//! Grounded in the lifecycle of
//! `examples/original_source/contentflow-lib/contentflow/executors/base.py::handle_content`
//! and structurally modeled on the teacher's async trait-object executor
//! pattern (`NodeExecutor` in
//! `examples/matbeedotcom-remotemedia-sdk/runtime/src/executor/node_executor.rs`).

pub mod builtin;
pub mod fan_in;
pub mod input;
pub mod parallel;
pub mod registry;
pub mod subpipeline;

use crate::condition::SecureConditionEvaluator;
use crate::content::{Content, ContentInput, ExecutorLogEntry};
use crate::error::{Error, Result};
use crate::pipeline::engine::CancellationToken;
use crate::value::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::env;

/// What an executor invocation produced: the message to forward downstream
/// plus whether the original input passed through unchanged (disabled,
/// condition miss, or error with `fail_pipeline_on_error=false`).
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    pub output: ContentInput,
    pub passed_through: bool,
    pub error: Option<String>,
}

/// Common settings every executor instance carries (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub id: String,
    pub enabled: bool,
    pub condition: Option<String>,
    pub fail_pipeline_on_error: bool,
    pub raw: IndexMap<String, Value>,
}

impl ExecutorSettings {
    /// Build settings from a raw id + settings map, resolving `${NAME}`
    /// environment substitutions eagerly (construction time, not per
    /// invocation — see `SPEC_FULL.md` §4.1).
    pub fn new(id: impl Into<String>, mut raw: IndexMap<String, Value>) -> Result<Self> {
        resolve_env_substitutions(&mut raw, &id.into())?;
        let id = match raw.get("__resolved_id__") {
            Some(Value::String(s)) => s.clone(),
            _ => unreachable!("id is always threaded through as __resolved_id__"),
        };
        raw.shift_remove("__resolved_id__");

        let enabled = bool_setting(&raw, "enabled", true);
        let fail_pipeline_on_error = bool_setting(&raw, "fail_pipeline_on_error", false);
        let condition = match raw.get("condition") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        Ok(Self {
            id,
            enabled,
            condition,
            fail_pipeline_on_error,
            raw,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.raw.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        match self.raw.get(key) {
            Some(Value::Int(i)) if *i >= 0 => *i as usize,
            Some(Value::Float(f)) if *f >= 0.0 => *f as usize,
            _ => default,
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.raw.get(key) {
            Some(Value::Int(i)) if *i >= 0 => *i as u64,
            Some(Value::Float(f)) if *f >= 0.0 => *f as u64,
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        bool_setting(&self.raw, key, default)
    }
}

fn bool_setting(raw: &IndexMap<String, Value>, key: &str, default: bool) -> bool {
    match raw.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => default,
    }
}

/// Threads `id` through the map under a sentinel key so [`ExecutorSettings::new`]
/// can resolve substitutions for every string value (including one that
/// happened to be named `id`) in a single pass, then recovers it.
fn resolve_env_substitutions(raw: &mut IndexMap<String, Value>, id: &str) -> Result<()> {
    raw.insert(
        "__resolved_id__".to_string(),
        Value::String(id.to_string()),
    );
    for (key, value) in raw.iter_mut() {
        resolve_value(key, value)?;
    }
    Ok(())
}

fn resolve_value(key: &str, value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(resolved) = resolve_env_string(key, s)? {
                *s = resolved;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                resolve_value(key, item)?;
            }
        }
        Value::Mapping(map) => {
            for (k, v) in map.iter_mut() {
                resolve_value(k, v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolves a single `${NAME}` string. An unset variable is a `ConfigError`
/// (stricter than the original Python, which warns and leaves the literal
/// string — see `SPEC_FULL.md` §4.1 for the rationale).
fn resolve_env_string(setting_key: &str, raw: &str) -> Result<Option<String>> {
    if !(raw.starts_with("${") && raw.ends_with('}')) {
        return Ok(None);
    }
    let name = &raw[2..raw.len() - 1];
    match env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(Error::Config(format!(
            "setting '{setting_key}' references unset environment variable '{name}'"
        ))),
    }
}

/// The one method concrete executors implement.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Stable identity of this executor instance within its pipeline.
    fn id(&self) -> &str;

    /// Shared lifecycle settings (enabled/condition/error policy).
    fn settings(&self) -> &ExecutorSettings;

    /// Executor-specific processing. Implementations must accept both a
    /// single `Content` and a list, per `spec.md` §4.1. `cancellation`
    /// must be honored at any internal suspension point (`spec.md` §5);
    /// leaf executors that never suspend for long can ignore it.
    async fn process_input(
        &self,
        input: ContentInput,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<ContentInput>;

    /// Events from a nested run this invocation performed internally.
    /// Only [`crate::executor::subpipeline::SubPipelineExecutor`] with
    /// `allow_direct_output` set ever returns anything here; every other
    /// executor keeps the default empty vec.
    fn take_direct_output_events(&self) -> Vec<crate::pipeline::engine::PipelineEvent> {
        Vec::new()
    }

    /// Full lifecycle per `spec.md` §4.1: enabled check, condition gating,
    /// `process_input`, error policy. Concrete executors do not override
    /// this; it is provided so both leaf executors and composite ones
    /// (parallel/input/fan-in/sub-pipeline) get identical semantics.
    async fn handle_input(
        &self,
        input: ContentInput,
        evaluator: &SecureConditionEvaluator,
        cancellation: &CancellationToken,
    ) -> Result<ExecutorOutcome> {
        let settings = self.settings();

        if !settings.enabled {
            return Ok(ExecutorOutcome {
                output: input,
                passed_through: true,
                error: None,
            });
        }

        let was_single = input.is_single();

        let (to_process, skipped): (ContentInput, Vec<Content>) = match &settings.condition {
            None => (input, Vec::new()),
            Some(condition) => match input {
                ContentInput::One(item) => {
                    let matched = evaluator.evaluate(condition, &item)?;
                    if matched {
                        (ContentInput::One(item), Vec::new())
                    } else {
                        return Ok(ExecutorOutcome {
                            output: ContentInput::One(item),
                            passed_through: true,
                            error: None,
                        });
                    }
                }
                ContentInput::Many(items) => {
                    let mut kept = Vec::new();
                    let mut skipped = Vec::new();
                    for item in items {
                        if evaluator.evaluate(condition, &item)? {
                            kept.push(item);
                        } else {
                            skipped.push(item);
                        }
                    }
                    (ContentInput::Many(kept), skipped)
                }
            },
        };

        if to_process.is_empty() {
            return Ok(ExecutorOutcome {
                output: ContentInput::Many(skipped),
                passed_through: true,
                error: None,
            });
        }

        let original_on_error = to_process.clone();
        match self.process_input(to_process, cancellation).await {
            Ok(processed) => {
                let mut items = processed.into_vec();
                items.extend(skipped);
                Ok(ExecutorOutcome {
                    output: ContentInput::reshape(was_single, items),
                    passed_through: false,
                    error: None,
                })
            }
            Err(err) => {
                if settings.fail_pipeline_on_error {
                    Err(Error::executor(settings.id.clone(), err))
                } else {
                    let message = err.to_string();
                    let mut items = original_on_error.into_vec();
                    for item in items.iter_mut() {
                        item.executor_logs
                            .push(ExecutorLogEntry::failed(settings.id.clone(), message.clone()));
                    }
                    items.extend(skipped);
                    Ok(ExecutorOutcome {
                        output: ContentInput::reshape(was_single, items),
                        passed_through: true,
                        error: Some(message),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentIdentifier;

    struct PassThrough {
        settings: ExecutorSettings,
    }

    #[async_trait]
    impl Executor for PassThrough {
        fn id(&self) -> &str {
            &self.settings.id
        }
        fn settings(&self) -> &ExecutorSettings {
            &self.settings
        }
        async fn process_input(
            &self,
            input: ContentInput,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<ContentInput> {
            Ok(input)
        }
    }

    fn settings(id: &str, raw: IndexMap<String, Value>) -> ExecutorSettings {
        ExecutorSettings::new(id, raw).unwrap()
    }

    #[tokio::test]
    async fn disabled_executor_passes_through_unchanged() {
        let mut raw = IndexMap::new();
        raw.insert("enabled".to_string(), Value::Bool(false));
        let exec = PassThrough {
            settings: settings("p1", raw),
        };
        let evaluator = SecureConditionEvaluator::new();
        let content = Content::new(ContentIdentifier::new("x", "hash"));
        let outcome = exec
            .handle_input(ContentInput::One(content.clone()), &evaluator, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.passed_through);
        match outcome.output {
            ContentInput::One(c) => assert_eq!(c.id.canonical_id, content.id.canonical_id),
            _ => panic!("expected single item"),
        }
    }

    #[tokio::test]
    async fn condition_partitions_list_input() {
        let mut raw = IndexMap::new();
        raw.insert(
            "condition".to_string(),
            Value::String("data.kind == 'a'".to_string()),
        );
        let exec = PassThrough {
            settings: settings("p2", raw),
        };
        let evaluator = SecureConditionEvaluator::new();
        let mut a = Content::new(ContentIdentifier::new("a", "ha"));
        a.data.insert("kind".to_string(), Value::String("a".into()));
        let mut b = Content::new(ContentIdentifier::new("b", "hb"));
        b.data.insert("kind".to_string(), Value::String("b".into()));

        let outcome = exec
            .handle_input(ContentInput::Many(vec![a, b]), &evaluator, &CancellationToken::new())
            .await
            .unwrap();
        let items = outcome.output.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.canonical_id, "a");
        assert_eq!(items[1].id.canonical_id, "b");
    }

    #[tokio::test]
    async fn required_env_var_missing_is_config_error() {
        let mut raw = IndexMap::new();
        raw.insert(
            "token".to_string(),
            Value::String("${CONTENTFLOW_TEST_UNSET_VAR}".to_string()),
        );
        let result = ExecutorSettings::new("p3", raw);
        assert!(result.is_err());
    }
}
