//! Recursive tagged-value tree used for `Content.data` / `Content.summary_data`.
//!
//! The original system carries arbitrary dynamically-typed mappings between
//! executors. This is the statically-typed equivalent: a value is either a
//! scalar, a sequence, or an ordered mapping, and it round-trips losslessly
//! to/from JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered string-keyed mapping of [`Value`]s.
pub type Mapping = IndexMap<String, Value>;

/// A dynamically-typed value carried through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent/null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values.
    Sequence(Vec<Value>),
    /// Ordered string-keyed mapping.
    Mapping(Mapping),
}

impl Value {
    /// True for `Null`, an empty string, or an empty sequence — the
    /// `is_empty` condition-evaluator semantics (mappings are never "empty"
    /// under this rule, matching the source's `is_empty` definition).
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Sequence(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Best-effort string rendering used by the condition evaluator for
    /// operators like `contains`/`starts_with` against non-string fields.
    pub fn as_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Numeric coercion used by ordering operators (`>`, `>=`, `<`, `<=`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Index into a sequence or mapping by string key; mappings are keyed
    /// directly, sequences require a numeric string.
    pub fn get_index(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(m) => m.get(key),
            Value::Sequence(s) => key.parse::<usize>().ok().and_then(|i| s.get(i)),
            _ => None,
        }
    }

    /// Navigate a field by plain name (mapping key lookup).
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Mapping(m) => m.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Mapping(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Sequence(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => Value::Mapping(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Mapping(m) => serde_json::Value::Object(
                m.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_preserves_shape() {
        let json = serde_json::json!({
            "a": 1,
            "b": [1, 2.5, "three", null, true],
            "c": {"nested": "value"}
        });
        let value: Value = json.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(json, back);
    }

    #[test]
    fn is_empty_value_rules() {
        assert!(Value::Null.is_empty_value());
        assert!(Value::String(String::new()).is_empty_value());
        assert!(Value::Sequence(vec![]).is_empty_value());
        assert!(!Value::Sequence(vec![Value::Int(1)]).is_empty_value());
        assert!(!Value::Int(0).is_empty_value());
        assert!(!Value::Mapping(Mapping::new()).is_empty_value());
    }

    #[test]
    fn get_field_and_index() {
        let mut m = Mapping::new();
        m.insert("x".to_string(), Value::Int(5));
        let v = Value::Mapping(m);
        assert_eq!(v.get_field("x"), Some(&Value::Int(5)));
        assert_eq!(v.get_field("missing"), None);

        let seq = Value::Sequence(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(seq.get_index("1"), Some(&Value::Int(20)));
        assert_eq!(seq.get_index("9"), None);
    }
}
