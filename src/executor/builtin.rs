//! A handful of simple leaf executors, used both as registry defaults and
//! as building blocks in tests.
//!
//! Grounded in the teacher's `PassThroughNode`/`EchoNode`/`CalculatorNode`
//! (`examples/matbeedotcom-remotemedia-sdk/runtime/src/nodes/mod.rs`),
//! adapted from the node-graph's `NodeExecutor` contract to this crate's
//! `Executor` contract and `Content`/`ContentInput` types.

use crate::content::{Content, ExecutorLogEntry};
use crate::error::Result;
use crate::executor::{Executor, ExecutorSettings};
use crate::pipeline::engine::CancellationToken;
use crate::value::{Mapping, Value};
use async_trait::async_trait;
use indexmap::IndexMap;

/// Forwards its input unchanged, appending a `completed` log entry. Used
/// as the default no-op executor type and throughout the test suite.
pub struct PassThroughExecutor {
    settings: ExecutorSettings,
}

impl PassThroughExecutor {
    pub fn new(id: String, raw: Mapping) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        Ok(Self {
            settings: ExecutorSettings::new(id, raw)?,
        })
    }
}

#[async_trait]
impl Executor for PassThroughExecutor {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    async fn process_input(
        &self,
        input: crate::content::ContentInput,
        _cancellation: &CancellationToken,
    ) -> anyhow::Result<crate::content::ContentInput> {
        let mut items = input.into_vec();
        for item in items.iter_mut() {
            item.executor_logs
                .push(ExecutorLogEntry::completed(self.id()));
        }
        Ok(crate::content::ContentInput::Many(items))
    }
}

/// Copies `settings.source_field` into `data[settings.target_field]`
/// (default `echo` -> `echoed`). Mirrors the teacher's `EchoNode`, which
/// exists purely to give the test suite a visible, deterministic
/// transformation to assert on.
pub struct EchoExecutor {
    settings: ExecutorSettings,
    source_field: String,
    target_field: String,
}

impl EchoExecutor {
    pub fn new(id: String, raw: Mapping) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        let settings = ExecutorSettings::new(id, raw)?;
        let source_field = settings.get_str("source_field", "echo");
        let target_field = settings.get_str("target_field", "echoed");
        Ok(Self {
            settings,
            source_field,
            target_field,
        })
    }
}

#[async_trait]
impl Executor for EchoExecutor {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    async fn process_input(
        &self,
        input: crate::content::ContentInput,
        _cancellation: &CancellationToken,
    ) -> anyhow::Result<crate::content::ContentInput> {
        let mut items = input.into_vec();
        for item in items.iter_mut() {
            let value = item
                .data
                .get(&self.source_field)
                .cloned()
                .unwrap_or(Value::Null);
            item.data.insert(self.target_field.clone(), value);
            item.executor_logs
                .push(ExecutorLogEntry::completed(self.id()));
        }
        Ok(crate::content::ContentInput::Many(items))
    }
}

/// Applies a binary arithmetic op (`add`, `subtract`, `multiply`, `divide`)
/// over two numeric fields, writing the result to `result_field`. Mirrors
/// the teacher's `CalculatorNode`/`AddNode`/`MultiplyNode` family collapsed
/// into one configurable executor.
pub struct CalculatorExecutor {
    settings: ExecutorSettings,
    operation: String,
    left_field: String,
    right_field: String,
    result_field: String,
}

impl CalculatorExecutor {
    pub fn new(id: String, raw: Mapping) -> Result<Self> {
        let raw: IndexMap<String, Value> = raw.into_iter().collect();
        let settings = ExecutorSettings::new(id, raw)?;
        let operation = settings.get_str("operation", "add");
        let left_field = settings.get_str("left_field", "left");
        let right_field = settings.get_str("right_field", "right");
        let result_field = settings.get_str("result_field", "result");
        Ok(Self {
            settings,
            operation,
            left_field,
            right_field,
            result_field,
        })
    }

    fn compute(&self, content: &Content) -> anyhow::Result<f64> {
        let left = content
            .data
            .get(&self.left_field)
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("missing or non-numeric field '{}'", self.left_field))?;
        let right = content
            .data
            .get(&self.right_field)
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("missing or non-numeric field '{}'", self.right_field))?;
        match self.operation.as_str() {
            "add" => Ok(left + right),
            "subtract" => Ok(left - right),
            "multiply" => Ok(left * right),
            "divide" => {
                if right == 0.0 {
                    Err(anyhow::anyhow!("division by zero"))
                } else {
                    Ok(left / right)
                }
            }
            other => Err(anyhow::anyhow!("unknown operation '{other}'")),
        }
    }
}

#[async_trait]
impl Executor for CalculatorExecutor {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    async fn process_input(
        &self,
        input: crate::content::ContentInput,
        _cancellation: &CancellationToken,
    ) -> anyhow::Result<crate::content::ContentInput> {
        let mut items = input.into_vec();
        for item in items.iter_mut() {
            let value = self.compute(item)?;
            item.data
                .insert(self.result_field.clone(), Value::Float(value));
            item.executor_logs
                .push(ExecutorLogEntry::completed(self.id()));
        }
        Ok(crate::content::ContentInput::Many(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentIdentifier, ContentInput};

    fn content(canonical: &str) -> Content {
        Content::new(ContentIdentifier::new(canonical, format!("hash-{canonical}")))
    }

    #[tokio::test]
    async fn pass_through_appends_completed_log() {
        let exec = PassThroughExecutor::new("p1".to_string(), Mapping::new()).unwrap();
        let out = exec
            .process_input(ContentInput::One(content("a")), &CancellationToken::new())
            .await
            .unwrap();
        let items = out.into_vec();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].executor_logs.len(), 1);
    }

    #[tokio::test]
    async fn echo_copies_source_to_target() {
        let mut raw = Mapping::new();
        raw.insert("source_field".to_string(), Value::String("msg".to_string()));
        raw.insert("target_field".to_string(), Value::String("out".to_string()));
        let exec = EchoExecutor::new("e1".to_string(), raw).unwrap();
        let mut c = content("a");
        c.data.insert("msg".to_string(), Value::String("hi".to_string()));
        let out = exec
            .process_input(ContentInput::One(c), &CancellationToken::new())
            .await
            .unwrap();
        let items = out.into_vec();
        assert_eq!(items[0].data.get("out"), Some(&Value::String("hi".to_string())));
    }

    #[tokio::test]
    async fn calculator_adds_two_fields() {
        let mut raw = Mapping::new();
        raw.insert("operation".to_string(), Value::String("add".to_string()));
        let exec = CalculatorExecutor::new("c1".to_string(), raw).unwrap();
        let mut c = content("a");
        c.data.insert("left".to_string(), Value::Int(2));
        c.data.insert("right".to_string(), Value::Int(3));
        let out = exec
            .process_input(ContentInput::One(c), &CancellationToken::new())
            .await
            .unwrap();
        let items = out.into_vec();
        assert_eq!(items[0].data.get("result"), Some(&Value::Float(5.0)));
    }

    #[tokio::test]
    async fn calculator_divide_by_zero_errors() {
        let mut raw = Mapping::new();
        raw.insert("operation".to_string(), Value::String("divide".to_string()));
        let exec = CalculatorExecutor::new("c1".to_string(), raw).unwrap();
        let mut c = content("a");
        c.data.insert("left".to_string(), Value::Int(2));
        c.data.insert("right".to_string(), Value::Int(0));
        let result = exec
            .process_input(ContentInput::One(c), &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
