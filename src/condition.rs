//! Secure, restricted boolean-expression evaluator used for per-executor
//! `condition` gating and per-edge conditional routing.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/utils/secure_condition_evaluator.py`.
//! This is not a general-purpose expression language: the grammar, the
//! field-path rules, and the pre-parse security checks are deliberately
//! narrow (`spec.md` §4.9, §1 non-goals).

use crate::content::Content;
use crate::error::{Error, Result};
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

const MAX_FIELD_DEPTH: usize = 10;

const DANGEROUS_SUBSTRINGS: &[&str] = &[
    "__class__",
    "__import__",
    "__globals__",
    "__builtins__",
    "__subclasses__",
    "__bases__",
    "__mro__",
];

const DANGEROUS_CALLS: &[&str] = &[
    "eval(",
    "exec(",
    "compile(",
    "__import__(",
    "open(",
    "file(",
    "input(",
    "raw_input(",
    "globals(",
    "locals(",
    "vars(",
    "dir(",
    "getattr(",
    "setattr(",
    "hasattr(",
    "delattr(",
];

/// Comparison operators, ordered longest-first so substring scanning for an
/// operator never matches a shorter operator that is a prefix of a longer
/// one (e.g. `>=` must be tried before `>`).
const OPERATORS: &[&str] = &[
    "not_contains",
    "starts_with",
    "ends_with",
    "regex_match",
    "not_in",
    ">=",
    "<=",
    "==",
    "!=",
    "contains",
    "in",
    ">",
    "<",
];

#[derive(Debug, Clone)]
enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Compare {
        field: String,
        op: String,
        value: Option<ParsedValue>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum ParsedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParsedValue>),
}

/// Parses and evaluates restricted boolean condition strings against a
/// [`Content`] item's `data` field, with a cache of compiled `regex_match`
/// patterns.
pub struct SecureConditionEvaluator {
    regex_cache: Mutex<HashMap<String, Regex>>,
}

impl Default for SecureConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureConditionEvaluator {
    pub fn new() -> Self {
        Self {
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate `condition` against `content`. Runs the security check,
    /// parses, then evaluates.
    pub fn evaluate(&self, condition: &str, content: &Content) -> Result<bool> {
        let expr = self.parse(condition)?;
        self.eval_expr(&expr, content)
    }

    /// Validate a condition string without evaluating it against any
    /// content, returning the list of problems found (empty = valid).
    pub fn validate(&self, condition: &str) -> Vec<String> {
        match self.parse(condition) {
            Ok(_) => Vec::new(),
            Err(e) => vec![e.to_string()],
        }
    }

    fn parse(&self, condition: &str) -> Result<Expr> {
        Self::security_check(condition)?;
        let trimmed = condition.trim();
        if trimmed.is_empty() {
            return Err(Error::Condition("empty condition".to_string()));
        }
        self.parse_or(trimmed)
    }

    fn security_check(condition: &str) -> Result<()> {
        if condition.contains(';') {
            return Err(Error::Condition(
                "condition contains forbidden character ';'".to_string(),
            ));
        }
        for pattern in DANGEROUS_SUBSTRINGS {
            if condition.contains(pattern) {
                return Err(Error::Condition(format!(
                    "condition contains forbidden pattern '{pattern}'"
                )));
            }
        }
        for call in DANGEROUS_CALLS {
            if condition.contains(call) {
                return Err(Error::Condition(format!(
                    "condition contains forbidden call '{call}'"
                )));
            }
        }
        Ok(())
    }

    /// AND binds tighter than OR, so OR is the outermost split: `a or b and
    /// c` groups as `a or (b and c)`, not `(a or b) and c`.
    fn parse_or(&self, expr: &str) -> Result<Expr> {
        let segments = split_top_level(expr, " or ");
        if segments.len() > 1 {
            let mut parts = Vec::with_capacity(segments.len());
            for seg in segments {
                parts.push(self.parse_and_segment(seg.trim())?);
            }
            return Ok(Expr::Or(parts));
        }
        self.parse_and_segment(expr.trim())
    }

    fn parse_and_segment(&self, segment: &str) -> Result<Expr> {
        let and_segments = split_top_level(segment, " and ");
        if and_segments.len() > 1 {
            let mut parts = Vec::with_capacity(and_segments.len());
            for seg in and_segments {
                parts.push(self.parse_atom(seg.trim())?);
            }
            return Ok(Expr::And(parts));
        }
        self.parse_atom(segment.trim())
    }

    fn parse_atom(&self, atom: &str) -> Result<Expr> {
        let atom = strip_matching_parens(atom.trim());
        // Re-check for and/or now that parens are stripped: a fully
        // parenthesized compound expression recurses back into parse_or.
        if split_top_level(atom, " and ").len() > 1 || split_top_level(atom, " or ").len() > 1 {
            return self.parse_or(atom);
        }

        for op in OPERATORS {
            if let Some(idx) = find_operator(atom, op) {
                let field = atom[..idx].trim().to_string();
                let rest = atom[idx + op.len()..].trim();
                validate_field_path(&field)?;
                let value = parse_value(rest)?;
                return Ok(Expr::Compare {
                    field,
                    op: (*op).to_string(),
                    value: Some(value),
                });
            }
        }

        // Unary forms: "field is_empty" / "field is_not_empty".
        if let Some(field) = atom.strip_suffix("is_not_empty") {
            let field = field.trim().to_string();
            validate_field_path(&field)?;
            return Ok(Expr::Compare {
                field,
                op: "is_not_empty".to_string(),
                value: None,
            });
        }
        if let Some(field) = atom.strip_suffix("is_empty") {
            let field = field.trim().to_string();
            validate_field_path(&field)?;
            return Ok(Expr::Compare {
                field,
                op: "is_empty".to_string(),
                value: None,
            });
        }

        Err(Error::Condition(format!(
            "could not parse condition atom: '{atom}'"
        )))
    }

    fn eval_expr(&self, expr: &Expr, content: &Content) -> Result<bool> {
        match expr {
            Expr::And(parts) => {
                for p in parts {
                    if !self.eval_expr(p, content)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or(parts) => {
                for p in parts {
                    if self.eval_expr(p, content)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Compare { field, op, value } => {
                let field_value = get_field_value(content, field);
                self.eval_compare(field_value, op, value.as_ref())
            }
        }
    }

    fn eval_compare(
        &self,
        field_value: Option<&Value>,
        op: &str,
        rhs: Option<&ParsedValue>,
    ) -> Result<bool> {
        match op {
            "is_empty" => Ok(field_value.map(|v| v.is_empty_value()).unwrap_or(true)),
            "is_not_empty" => Ok(!field_value.map(|v| v.is_empty_value()).unwrap_or(true)),
            "==" => Ok(values_equal(field_value, rhs)),
            "!=" => Ok(!values_equal(field_value, rhs)),
            ">" | ">=" | "<" | "<=" => {
                let (Some(fv), Some(rv)) = (field_value, rhs) else {
                    return Ok(false);
                };
                let (Some(lhs), Some(rhs_num)) = (fv.as_f64(), parsed_as_f64(rv)) else {
                    return Ok(false);
                };
                Ok(match op {
                    ">" => lhs > rhs_num,
                    ">=" => lhs >= rhs_num,
                    "<" => lhs < rhs_num,
                    "<=" => lhs <= rhs_num,
                    _ => unreachable!(),
                })
            }
            "contains" | "not_contains" => {
                let contains = match (field_value, rhs) {
                    (Some(Value::Sequence(items)), Some(rv)) => {
                        items.iter().any(|item| values_equal(Some(item), Some(rv)))
                    }
                    (Some(fv), Some(ParsedValue::String(needle))) => {
                        fv.as_display_string().contains(needle.as_str())
                    }
                    _ => false,
                };
                Ok(if op == "contains" { contains } else { !contains })
            }
            "in" | "not_in" => {
                let is_in = match rhs {
                    Some(ParsedValue::List(items)) => items
                        .iter()
                        .any(|item| values_equal(field_value, Some(item))),
                    Some(ParsedValue::String(s)) => field_value
                        .map(|v| s.contains(v.as_display_string().as_str()))
                        .unwrap_or(false),
                    _ => false,
                };
                Ok(if op == "in" { is_in } else { !is_in })
            }
            "starts_with" => Ok(field_value
                .zip(rhs)
                .map(|(fv, rv)| fv.as_display_string().starts_with(&parsed_as_string(rv)))
                .unwrap_or(false)),
            "ends_with" => Ok(field_value
                .zip(rhs)
                .map(|(fv, rv)| fv.as_display_string().ends_with(&parsed_as_string(rv)))
                .unwrap_or(false)),
            "regex_match" => {
                let (Some(fv), Some(rv)) = (field_value, rhs) else {
                    return Ok(false);
                };
                let pattern = parsed_as_string(rv);
                let haystack = fv.as_display_string();
                self.regex_match(&pattern, &haystack)
            }
            other => Err(Error::Condition(format!("unknown operator '{other}'"))),
        }
    }

    fn regex_match(&self, pattern: &str, haystack: &str) -> Result<bool> {
        let mut cache = self.regex_cache.lock().expect("regex cache poisoned");
        if let Some(re) = cache.get(pattern) {
            return Ok(re.is_match(haystack));
        }
        let re = Regex::new(pattern)
            .map_err(|e| Error::Condition(format!("invalid regex '{pattern}': {e}")))?;
        let matched = re.is_match(haystack);
        cache.insert(pattern.to_string(), re);
        Ok(matched)
    }
}

fn parsed_as_f64(v: &ParsedValue) -> Option<f64> {
    match v {
        ParsedValue::Int(i) => Some(*i as f64),
        ParsedValue::Float(f) => Some(*f),
        ParsedValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parsed_as_string(v: &ParsedValue) -> String {
    match v {
        ParsedValue::Null => String::new(),
        ParsedValue::Bool(b) => b.to_string(),
        ParsedValue::Int(i) => i.to_string(),
        ParsedValue::Float(f) => f.to_string(),
        ParsedValue::String(s) => s.clone(),
        ParsedValue::List(_) => String::new(),
    }
}

fn values_equal(field_value: Option<&Value>, rhs: Option<&ParsedValue>) -> bool {
    let (Some(fv), Some(rv)) = (field_value, rhs) else {
        // Missing field paths evaluate to absent; absent is non-equal to
        // every value, including an explicit `null` on the right.
        return false;
    };
    match (fv, rv) {
        (Value::Null, ParsedValue::Null) => true,
        (Value::Bool(a), ParsedValue::Bool(b)) => a == b,
        (Value::Int(a), ParsedValue::Int(b)) => a == b,
        (Value::Int(a), ParsedValue::Float(b)) => (*a as f64) == *b,
        (Value::Float(a), ParsedValue::Float(b)) => a == b,
        (Value::Float(a), ParsedValue::Int(b)) => *a == (*b as f64),
        (Value::String(a), ParsedValue::String(b)) => a == b,
        (Value::Sequence(a), ParsedValue::List(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| values_equal(Some(x), Some(y)))
        }
        _ => false,
    }
}

/// Walks a dot-segmented, optionally bracket-indexed path rooted at either
/// `data.*` or `summary_data.*` (the two mappings a condition is allowed to
/// inspect). The first segment selects the root; any missing segment along
/// the way yields `None`.
fn get_field_value<'a>(content: &'a Content, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let root_name = segments.next()?;
    let root_mapping = match root_name {
        "data" => &content.data,
        "summary_data" => &content.summary_data,
        _ => return None,
    };

    let mut current: &Value = match segments.next() {
        Some(first) => {
            let (name, index) = split_index(first);
            let mut v = root_mapping.get(name)?;
            if let Some(idx) = index {
                v = v.get_index(&idx)?;
            }
            v
        }
        // Bare "data" / "summary_data" with no further segment: no scalar
        // value to compare against, so treat as absent.
        None => return None,
    };

    for segment in segments {
        let (name, index) = split_index(segment);
        current = current.get_field(name)?;
        if let Some(idx) = index {
            current = current.get_index(&idx)?;
        }
    }
    Some(current)
}

/// Splits `seg[i]` / `seg['k']` into `(seg, Some(index))`, or `(seg, None)`.
fn split_index(segment: &str) -> (&str, Option<String>) {
    if let Some(bracket_start) = segment.find('[') {
        if let Some(bracket_end) = segment.find(']') {
            let name = &segment[..bracket_start];
            let mut idx = segment[bracket_start + 1..bracket_end].trim();
            if (idx.starts_with('\'') && idx.ends_with('\''))
                || (idx.starts_with('"') && idx.ends_with('"'))
            {
                idx = &idx[1..idx.len() - 1];
            }
            return (name, Some(idx.to_string()));
        }
    }
    (segment, None)
}

fn validate_field_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Condition("empty field path".to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.len() > MAX_FIELD_DEPTH {
        return Err(Error::Condition(format!(
            "field path '{path}' exceeds max depth {MAX_FIELD_DEPTH}"
        )));
    }
    let field_pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static regex is valid");
    for segment in segments {
        let (name, index) = split_index(segment);
        if !field_pattern.is_match(name) {
            return Err(Error::Condition(format!(
                "invalid field path segment '{segment}' in '{path}'"
            )));
        }
        if let Some(idx) = index {
            if idx.parse::<usize>().is_err() && idx.is_empty() {
                return Err(Error::Condition(format!(
                    "invalid index in field path segment '{segment}'"
                )));
            }
        }
    }
    Ok(())
}

/// Splits `s` on the first occurrence of `sep` that is not inside a quoted
/// string or bracketed list, then recurses on the remainder. Returns the
/// original string as a single-element vec if `sep` never occurs at the top
/// level.
fn split_top_level<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let lower = s.to_lowercase();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let bytes = s.as_bytes();
    let lower_bytes = lower.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if let Some(q) = in_quote {
            if c == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                in_quote = Some(c);
                i += 1;
                continue;
            }
            '(' | '[' => {
                depth += 1;
                i += 1;
                continue;
            }
            ')' | ']' => {
                depth -= 1;
                i += 1;
                continue;
            }
            _ => {}
        }
        if depth == 0
            && in_quote.is_none()
            && i + sep_bytes.len() <= lower_bytes.len()
            && &lower_bytes[i..i + sep_bytes.len()] == sep_bytes
        {
            parts.push(&s[start..i]);
            i += sep_bytes.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&s[start..]);
    if parts.len() == 1 {
        vec![s]
    } else {
        parts
    }
}

fn strip_matching_parens(s: &str) -> &str {
    let s = s.trim();
    if s.starts_with('(') && s.ends_with(')') {
        let inner = &s[1..s.len() - 1];
        let mut depth = 0i32;
        for (idx, c) in inner.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        // The opening paren we stripped was not matched by
                        // the closing one we stripped; not a wrapping pair.
                        return s;
                    }
                }
                _ => {}
            }
            let _ = idx;
        }
        if depth == 0 {
            return strip_matching_parens(inner);
        }
    }
    s
}

fn find_operator(atom: &str, op: &str) -> Option<usize> {
    atom.find(op)
}

fn parse_value(raw: &str) -> Result<ParsedValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Condition("missing comparison value".to_string()));
    }
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Ok(ParsedValue::String(raw[1..raw.len() - 1].to_string()));
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        let items = split_top_level(inner, ",");
        let mut parsed = Vec::new();
        for item in items {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            parsed.push(parse_value(item)?);
        }
        return Ok(ParsedValue::List(parsed));
    }
    match raw.to_lowercase().as_str() {
        "true" => return Ok(ParsedValue::Bool(true)),
        "false" => return Ok(ParsedValue::Bool(false)),
        "null" | "none" => return Ok(ParsedValue::Null),
        _ => {}
    }
    if raw.contains('.') {
        if let Ok(f) = raw.parse::<f64>() {
            return Ok(ParsedValue::Float(f));
        }
    } else if let Ok(i) = raw.parse::<i64>() {
        return Ok(ParsedValue::Int(i));
    }
    Ok(ParsedValue::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentIdentifier;

    fn content_with(data: &[(&str, Value)]) -> Content {
        let mut c = Content::new(ContentIdentifier::new("x", "hash"));
        for (k, v) in data {
            c.data.insert(k.to_string(), v.clone());
        }
        c
    }

    #[test]
    fn simple_equality() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[("kind", Value::String("a".into()))]);
        assert!(evaluator.evaluate("data.kind == 'a'", &content).unwrap());
        assert!(!evaluator.evaluate("data.kind == 'b'", &content).unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[
            ("kind", Value::String("a".into())),
            ("priority", Value::Int(5)),
        ]);
        // "a or (b and false)" should be true just from the 'a' branch;
        // written without parens to exercise precedence directly:
        // kind == 'b' or kind == 'a' and priority == 5  => true
        assert!(evaluator
            .evaluate("data.kind == 'b' or data.kind == 'a' and data.priority == 5", &content)
            .unwrap());
    }

    #[test]
    fn or_does_not_absorb_a_later_and_clause() {
        let evaluator = SecureConditionEvaluator::new();
        // kind == 'b' is true, priority == 5 is false. Grouped correctly
        // (AND binds tighter) this is `b or (a and false)` => true from the
        // first disjunct alone. Grouped the wrong way around it would be
        // `(b or a) and false` => false, so this distinguishes the two.
        let content = content_with(&[
            ("kind", Value::String("b".into())),
            ("priority", Value::Int(5)),
        ]);
        assert!(evaluator
            .evaluate("data.kind == 'b' or data.kind == 'a' and data.priority == 99", &content)
            .unwrap());
    }

    #[test]
    fn numeric_comparisons() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[("score", Value::Int(10))]);
        assert!(evaluator.evaluate("data.score >= 10", &content).unwrap());
        assert!(evaluator.evaluate("data.score > 5", &content).unwrap());
        assert!(!evaluator.evaluate("data.score < 5", &content).unwrap());
    }

    #[test]
    fn is_empty_and_is_not_empty() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[("tags", Value::Sequence(vec![]))]);
        assert!(evaluator.evaluate("data.tags is_empty", &content).unwrap());
        assert!(!evaluator
            .evaluate("data.tags is_not_empty", &content)
            .unwrap());

        let missing = Content::new(ContentIdentifier::new("y", "hash"));
        assert!(evaluator
            .evaluate("data.anything is_empty", &missing)
            .unwrap());
    }

    #[test]
    fn contains_and_in() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[(
            "tags",
            Value::Sequence(vec![Value::String("x".into()), Value::String("y".into())]),
        )]);
        assert!(evaluator
            .evaluate("data.tags contains 'x'", &content)
            .unwrap());
        assert!(!evaluator
            .evaluate("data.tags not_contains 'x'", &content)
            .unwrap());

        let content2 = content_with(&[("kind", Value::String("a".into()))]);
        assert!(evaluator
            .evaluate("data.kind in ['a', 'b']", &content2)
            .unwrap());
    }

    #[test]
    fn regex_match_and_cache() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[("name", Value::String("file_042.csv".into()))]);
        assert!(evaluator
            .evaluate(r"data.name regex_match '^file_\d+\.csv$'", &content)
            .unwrap());
        // second call should hit the cache path without recompiling
        assert!(evaluator
            .evaluate(r"data.name regex_match '^file_\d+\.csv$'", &content)
            .unwrap());
    }

    #[test]
    fn rejects_dangerous_patterns() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[]);
        assert!(evaluator.evaluate("data.x == '1'; eval('2')", &content).is_err());
        assert!(evaluator
            .evaluate("data.x.__class__ == '1'", &content)
            .is_err());
        assert!(evaluator.evaluate("open('/etc/passwd')", &content).is_err());
    }

    #[test]
    fn missing_field_is_never_equal() {
        let evaluator = SecureConditionEvaluator::new();
        let content = Content::new(ContentIdentifier::new("x", "hash"));
        assert!(!evaluator.evaluate("data.missing == 'a'", &content).unwrap());
        assert!(!evaluator
            .evaluate("data.missing == null", &content)
            .unwrap());
    }

    #[test]
    fn bracket_index_into_sequence() {
        let evaluator = SecureConditionEvaluator::new();
        let content = content_with(&[(
            "items",
            Value::Sequence(vec![Value::String("first".into()), Value::String("second".into())]),
        )]);
        assert!(evaluator
            .evaluate("data.items[0] == 'first'", &content)
            .unwrap());
        assert!(evaluator
            .evaluate("data.items[1] == 'second'", &content)
            .unwrap());
    }

    #[test]
    fn exceeds_max_depth_rejected() {
        let evaluator = SecureConditionEvaluator::new();
        let deep_path = (0..12)
            .map(|i| format!("f{i}"))
            .collect::<Vec<_>>()
            .join(".");
        let condition = format!("{deep_path} == 'x'");
        let content = Content::new(ContentIdentifier::new("x", "hash"));
        assert!(evaluator.evaluate(&condition, &content).is_err());
    }
}
