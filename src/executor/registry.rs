//! Executor Registry (`spec.md` §4.5): catalog of executor types plus
//! schema-driven settings validation and instantiation.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/executors/executor_config.py`
//! (`validate_settings` type coercion) and
//! `examples/original_source/contentflow-lib/contentflow/executors/executor_registry.py`
//! (catalog/instance lifecycle), but replaces dynamic `importlib` class
//! loading with a static constructor registry, matching the teacher's
//! `NodeRegistry` (`examples/matbeedotcom-remotemedia-sdk/runtime/src/nodes/mod.rs`)
//! and `spec.md` §9's explicit design note.

use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorSettings};
use crate::value::{Mapping, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Schema definition for one executor setting (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingSchema {
    #[serde(rename = "type")]
    pub setting_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub options: Option<Vec<Value>>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// One catalog entry: the static description of an executor type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorCatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub module_path: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub settings_schema: IndexMap<String, SettingSchema>,
}

/// Top-level catalog document shape (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDocument {
    pub executor_catalog: Vec<ExecutorCatalogEntry>,
}

impl ExecutorCatalogEntry {
    /// Validate `provided` settings against this entry's schema, applying
    /// defaults and coercing types. Unknown keys are preserved verbatim.
    ///
    /// Ported from `executor_config.py::validate_settings`, including its
    /// literal (and slightly surprising) rule that `options` is enforced
    /// only when the field is also `required` — see `DESIGN.md`.
    pub fn validate_settings(&self, provided: &Mapping) -> Result<Mapping> {
        let mut validated = Mapping::new();

        for (key, schema) in &self.settings_schema {
            let mut value = provided.get(key).cloned();

            if schema.required && value.is_none() {
                return Err(Error::Config(format!(
                    "required setting '{key}' missing for executor '{}'",
                    self.id
                )));
            }

            if value.is_none() {
                value = schema.default.clone();
            }

            if let Some(v) = value {
                let coerced = coerce(&self.id, key, schema, v)?;
                validated.insert(key.clone(), coerced);
            } else {
                validated.insert(key.clone(), Value::Null);
            }
        }

        for (key, value) in provided {
            if !validated.contains_key(key) {
                validated.insert(key.clone(), value.clone());
            }
        }

        Ok(validated)
    }

    pub fn required_settings(&self) -> Vec<&str> {
        self.settings_schema
            .iter()
            .filter(|(_, s)| s.required)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

fn coerce(executor_id: &str, key: &str, schema: &SettingSchema, value: Value) -> Result<Value> {
    let coerced = match schema.setting_type.as_str() {
        "integer" => match value {
            Value::Int(i) => Value::Int(i),
            Value::Float(f) => Value::Int(f as i64),
            Value::String(ref s) => s.parse::<i64>().map(Value::Int).map_err(|_| {
                Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be an integer, got '{s}'"
                ))
            })?,
            other => {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be an integer, got {other:?}"
                )))
            }
        },
        "number" => match value {
            Value::Int(i) => Value::Float(i as f64),
            Value::Float(f) => Value::Float(f),
            Value::String(ref s) => s.parse::<f64>().map(Value::Float).map_err(|_| {
                Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be a number, got '{s}'"
                ))
            })?,
            other => {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be a number, got {other:?}"
                )))
            }
        },
        "boolean" => match value {
            Value::Bool(b) => Value::Bool(b),
            Value::String(ref s) => {
                Value::Bool(matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"))
            }
            other => {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be a boolean, got {other:?}"
                )))
            }
        },
        "string" => match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.as_display_string()),
        },
        _ => value,
    };

    if let Some(min) = schema.min {
        if let Some(num) = coerced.as_f64() {
            if num < min {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be >= {min}, got {num}"
                )));
            }
        }
    }
    if let Some(max) = schema.max {
        if let Some(num) = coerced.as_f64() {
            if num > max {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be <= {max}, got {num}"
                )));
            }
        }
    }
    // The source enforces `options` only for required fields; kept
    // literally per `spec.md` §4.5 ("enforce required, min, max, and
    // options (if required)").
    if schema.required {
        if let Some(options) = &schema.options {
            if !options.contains(&coerced) {
                return Err(Error::Config(format!(
                    "setting '{key}' for executor '{executor_id}' must be one of {options:?}, got {coerced:?}"
                )));
            }
        }
    }

    Ok(coerced)
}

/// Constructs a concrete [`Executor`] from an instance id and its validated
/// settings.
pub type ExecutorFactory =
    Arc<dyn Fn(String, Mapping) -> Result<Box<dyn Executor>> + Send + Sync>;

/// Catalog of known executor types plus the static constructors that
/// realize them.
pub struct ExecutorRegistry {
    catalog: HashMap<String, ExecutorCatalogEntry>,
    factories: HashMap<String, ExecutorFactory>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            catalog: HashMap::new(),
            factories: HashMap::new(),
        }
    }

    /// Register a catalog entry together with its constructor. Both must be
    /// present before `create_instance` can resolve the type.
    pub fn register<F>(&mut self, entry: ExecutorCatalogEntry, factory: F)
    where
        F: Fn(String, Mapping) -> Result<Box<dyn Executor>> + Send + Sync + 'static,
    {
        self.factories
            .insert(entry.id.clone(), Arc::new(factory));
        self.catalog.insert(entry.id.clone(), entry);
    }

    /// Load catalog entries from a YAML document and merge them into this
    /// registry, keeping any constructors already registered under those
    /// ids (a catalog entry with no matching constructor makes
    /// `create_instance` fail with a `ConfigError`, never a panic).
    pub fn load_catalog_yaml(&mut self, yaml: &str) -> Result<()> {
        let doc: CatalogDocument = serde_yaml::from_str(yaml)?;
        for entry in doc.executor_catalog {
            self.catalog.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    pub fn contains(&self, executor_type: &str) -> bool {
        self.catalog.contains_key(executor_type)
    }

    pub fn get_catalog_entry(&self, executor_type: &str) -> Option<&ExecutorCatalogEntry> {
        self.catalog.get(executor_type)
    }

    pub fn executor_types(&self) -> Vec<String> {
        self.catalog.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Validate settings then construct the executor instance
    /// (`spec.md` §4.5 `create_instance`).
    pub fn create_instance(
        &self,
        executor_type: &str,
        instance_id: impl Into<String>,
        provided_settings: &Mapping,
    ) -> Result<Box<dyn Executor>> {
        let entry = self
            .catalog
            .get(executor_type)
            .ok_or_else(|| Error::Config(format!("unknown executor type '{executor_type}'")))?;
        let validated = entry.validate_settings(provided_settings)?;
        let factory = self.factories.get(executor_type).ok_or_else(|| {
            Error::Config(format!(
                "executor type '{executor_type}' has a catalog entry but no registered constructor"
            ))
        })?;
        factory(instance_id.into(), validated)
    }
}

/// Turns a validated settings [`Mapping`] plus an instance id into
/// [`ExecutorSettings`], the piece every concrete `Executor` embeds.
pub fn build_executor_settings(id: String, settings: Mapping) -> Result<ExecutorSettings> {
    let raw: IndexMap<String, Value> = settings.into_iter().collect();
    ExecutorSettings::new(id, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::builtin::PassThroughExecutor;

    fn entry_with_schema() -> ExecutorCatalogEntry {
        let mut schema = IndexMap::new();
        schema.insert(
            "max_concurrent".to_string(),
            SettingSchema {
                setting_type: "integer".to_string(),
                title: "Max concurrent".to_string(),
                description: String::new(),
                required: false,
                default: Some(Value::Int(5)),
                options: None,
                min: Some(1.0),
                max: Some(100.0),
            },
        );
        ExecutorCatalogEntry {
            id: "pass_through".to_string(),
            name: "Pass Through".to_string(),
            description: String::new(),
            module_path: String::new(),
            class_name: String::new(),
            category: "test".to_string(),
            tags: vec![],
            version: "1.0".to_string(),
            settings_schema: schema,
        }
    }

    #[test]
    fn validate_settings_applies_defaults_and_coerces() {
        let entry = entry_with_schema();
        let mut provided = Mapping::new();
        provided.insert("max_concurrent".to_string(), Value::String("10".to_string()));
        let validated = entry.validate_settings(&provided).unwrap();
        assert_eq!(validated.get("max_concurrent"), Some(&Value::Int(10)));

        let defaulted = entry.validate_settings(&Mapping::new()).unwrap();
        assert_eq!(defaulted.get("max_concurrent"), Some(&Value::Int(5)));
    }

    #[test]
    fn validate_settings_rejects_out_of_range() {
        let entry = entry_with_schema();
        let mut provided = Mapping::new();
        provided.insert("max_concurrent".to_string(), Value::Int(500));
        assert!(entry.validate_settings(&provided).is_err());
    }

    #[test]
    fn registry_create_instance_roundtrip() {
        let mut registry = ExecutorRegistry::new();
        registry.register(entry_with_schema(), |id, settings| {
            Ok(Box::new(PassThroughExecutor::new(id, settings)?))
        });
        let instance = registry
            .create_instance("pass_through", "p1", &Mapping::new())
            .unwrap();
        assert_eq!(instance.id(), "p1");
    }

    #[test]
    fn registry_unknown_type_is_config_error() {
        let registry = ExecutorRegistry::new();
        let result = registry.create_instance("nope", "p1", &Mapping::new());
        assert!(result.is_err());
    }
}
