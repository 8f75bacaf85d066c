//! Fan-in aggregator (`spec.md` §4.4, component C6): joins multiple
//! upstream lists into one, grouping by `canonical_id`.
//!
//! Grounded in
//! `examples/original_source/contentflow-lib/contentflow/executors/fan_in_aggregator.py`
//! (`_merge_content_batches`). The original's shown merge only folds
//! `summary_data`/`data`; this port also concatenates `executor_logs` in
//! arrival order, per `spec.md` §4.4's explicit requirement — see
//! `DESIGN.md` for why that's treated as a gap in the source rather than a
//! deliberate difference.

use crate::content::Content;
use crate::value::Value;
use indexmap::IndexMap;

/// Flatten nested batches, group by `canonical_id`, and merge each group
/// into a single [`Content`] item.
///
/// - `summary_data`/`data`: first-value-wins per key (the first batch to
///   set a key keeps it; later batches may only add keys that are still
///   unset).
/// - `executor_logs`: concatenated in arrival order across all batches
///   that contributed to the group.
/// - Group ordering in the output: first-seen order of `canonical_id`
///   across the flattened input.
pub fn merge_content_batches(batches: Vec<Vec<Content>>) -> Vec<Content> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: IndexMap<String, Content> = IndexMap::new();

    for item in batches.into_iter().flatten() {
        let key = item.id.canonical_id.clone();
        match groups.get_mut(&key) {
            None => {
                order.push(key.clone());
                groups.insert(key, item);
            }
            Some(existing) => {
                merge_first_value_wins(&mut existing.summary_data, item.summary_data);
                merge_first_value_wins(&mut existing.data, item.data);
                existing.executor_logs.extend(item.executor_logs);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.shift_remove(&key))
        .collect()
}

fn merge_first_value_wins(target: &mut IndexMap<String, Value>, incoming: IndexMap<String, Value>) {
    for (key, value) in incoming {
        target.entry(key).or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentIdentifier, ExecutorLogEntry};

    fn content(canonical: &str, field: &str, value: &str) -> Content {
        let mut c = Content::new(ContentIdentifier::new(canonical, format!("hash-{canonical}")));
        c.data.insert(field.to_string(), Value::String(value.to_string()));
        c.executor_logs.push(ExecutorLogEntry::completed("src"));
        c
    }

    #[test]
    fn groups_by_canonical_id_first_seen_order() {
        let batches = vec![
            vec![content("b", "x", "1"), content("a", "x", "1")],
            vec![content("a", "y", "2")],
        ];
        let merged = merge_content_batches(batches);
        let ids: Vec<_> = merged.iter().map(|c| c.id.canonical_id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn first_value_wins_on_key_conflict() {
        let mut first = content("a", "x", "first");
        let mut second = content("a", "x", "second");
        second.data.insert("y".to_string(), Value::String("only-second".to_string()));
        first.id.unique_id = "h1".to_string();
        second.id.unique_id = "h2".to_string();

        let merged = merge_content_batches(vec![vec![first], vec![second]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].data.get("x"), Some(&Value::String("first".to_string())));
        assert_eq!(
            merged[0].data.get("y"),
            Some(&Value::String("only-second".to_string()))
        );
    }

    #[test]
    fn executor_logs_concatenate_in_arrival_order() {
        let first = content("a", "x", "1");
        let second = content("a", "y", "2");
        let merged = merge_content_batches(vec![vec![first], vec![second]]);
        assert_eq!(merged[0].executor_logs.len(), 2);
    }
}
