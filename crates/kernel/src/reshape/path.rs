//! Dotted-path access into nested JSON values.
//!
//! A path is a `.`-separated list of segments. Objects are addressed by key,
//! arrays by decimal index. Writing somewhere an array cannot represent (a
//! non-numeric key, or an index past the end) turns that array into an object
//! keyed by the stringified indices, so rows behave like ordered maps.
//!
//! The empty path is handled unevenly on purpose: [`read`], [`read_mut`],
//! [`cast`] and [`integrate`] ignore it, while [`write`] and [`unset`] treat it
//! as the single segment `""`. Call sites that need a real path check it with
//! [`require_valid_path`] first.

use serde_json::{Map, Value};

use super::cast::{CastKind, cast_value};
use crate::error::{Error, Result};

/// Ensure `path` is non-empty and has no empty segments.
pub fn require_valid_path(path: &str) -> Result<&str> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(Error::MalformedPath(path.to_string()));
    }
    Ok(path)
}

/// Value at `path`, or `None` when any segment is missing.
pub fn read<'a>(structure: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(structure, child)
}

/// Mutable value at `path`, or `None` when any segment is missing.
pub fn read_mut<'a>(structure: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(structure, child_mut)
}

/// Set the value at `path`, creating or overwriting intermediates as needed.
pub fn write(structure: &mut Value, path: &str, value: Value) {
    *slot_at(structure, path) = value;
}

/// Like [`write`], but two containers meet in a left-biased union instead
/// of the incoming value replacing the existing one.
pub fn integrate(structure: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        return;
    }
    union(slot_at(structure, path), value);
}

/// Remove the value at `path`. Missing segments make this a no-op.
pub fn unset(structure: &mut Value, path: &str) {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent_path, leaf)) => (Some(parent_path), leaf),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(parent_path) => parent_path.split('.').try_fold(structure, child_mut),
        None => Some(structure),
    };
    let Some(parent) = parent else {
        return;
    };

    match parent {
        Value::Object(map) => map.retain(|key, _| key != leaf),
        Value::Array(items) => {
            let Ok(index) = leaf.parse::<usize>() else {
                return;
            };
            if Some(index) == items.len().checked_sub(1) {
                items.pop();
            } else if index < items.len() {
                // Keep the remaining positions addressable.
                force_object(parent);
                if let Value::Object(map) = parent {
                    map.retain(|key, _| key != leaf);
                }
            }
        }
        _ => {}
    }
}

/// Coerce the value at `path` in place. Missing paths are ignored.
pub fn cast(structure: &mut Value, path: &str, kind: CastKind) {
    if let Some(value) = read_mut(structure, path) {
        cast_value(value, kind);
    }
}

/// One-level left-biased union of `incoming` into `existing`.
///
/// Object keys already present win and new keys are appended in incoming
/// order; arrays merge by position. When only one side is a container, or
/// neither is, `incoming` replaces `existing`.
pub fn union(existing: &mut Value, incoming: Value) {
    if existing.is_array() && incoming.is_object() {
        force_object(existing);
    }
    match (existing, incoming) {
        (Value::Object(current), Value::Object(incoming)) => {
            for (key, value) in incoming {
                current.entry(key).or_insert(value);
            }
        }
        (Value::Object(current), Value::Array(incoming)) => {
            for (index, value) in incoming.into_iter().enumerate() {
                current.entry(index.to_string()).or_insert(value);
            }
        }
        (Value::Array(current), Value::Array(incoming)) => {
            let len = current.len();
            current.extend(incoming.into_iter().skip(len));
        }
        (existing, incoming) => *existing = incoming,
    }
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => items.get_mut(key.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Walk to the leaf slot of `path`, creating every missing step. An absent
/// leaf is created as `null`.
fn slot_at<'a>(structure: &'a mut Value, path: &str) -> &'a mut Value {
    let mut segments = path.split('.').peekable();
    let mut current = structure;
    while let Some(segment) = segments.next() {
        let slot = slot_mut(current, segment);
        match segments.peek() {
            Some(next) => {
                if !slot.is_object() && !slot.is_array() {
                    *slot = empty_container(next);
                }
                current = slot;
            }
            None => return slot,
        }
    }
    current
}

fn empty_container(next_segment: &str) -> Value {
    if next_segment == "0" {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// The slot for `key` directly under `node`, inserting `null` when absent.
fn slot_mut<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if let Value::Array(items) = node {
        if let Some(index) = key.parse::<usize>().ok().filter(|index| *index <= items.len()) {
            if index == items.len() {
                items.push(Value::Null);
            }
            return &mut node[index];
        }
    }
    force_object(node);
    &mut node[key]
}

/// Turn `node` into an object: arrays become index-keyed, scalars are dropped.
fn force_object(node: &mut Value) {
    if node.is_object() {
        return;
    }
    let map = match node.take() {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Map::new(),
    };
    *node = Value::Object(map);
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_then_read_returns_the_value() {
        for path in ["a", "a.b", "a.b.c", "list.0", "list.0.name", "x.1"] {
            let mut row = json!({});
            write(&mut row, path, json!("v"));
            assert_eq!(read(&row, path), Some(&json!("v")), "path {path}");
        }
    }

    #[test]
    fn read_misses_return_none() {
        let row = json!({"a": {"b": 1}, "s": "text", "l": [1, 2]});
        assert_eq!(read(&row, ""), None);
        assert_eq!(read(&row, "missing"), None);
        assert_eq!(read(&row, "a.c"), None);
        assert_eq!(read(&row, "s.x"), None);
        assert_eq!(read(&row, "l.5"), None);
        assert_eq!(read(&row, "l.x"), None);
        assert_eq!(read(&row, "l.1"), Some(&json!(2)));
    }

    #[test]
    fn present_null_is_distinguishable_from_missing() {
        let row = json!({"a": null});
        assert_eq!(read(&row, "a"), Some(&Value::Null));
        assert_eq!(read(&row, "b"), None);
    }

    #[test]
    fn write_overwrites_scalars_on_the_way() {
        let mut row = json!({"a": 5});
        write(&mut row, "a.b", json!(1));
        assert_eq!(row, json!({"a": {"b": 1}}));
    }

    #[test]
    fn write_creates_arrays_for_zero_segments() {
        let mut row = json!({});
        write(&mut row, "items.0.id", json!(7));
        assert_eq!(row, json!({"items": [{"id": 7}]}));
        write(&mut row, "items.1.id", json!(8));
        assert_eq!(row, json!({"items": [{"id": 7}, {"id": 8}]}));
    }

    #[test]
    fn write_past_the_end_turns_array_into_object() {
        let mut row = json!({"l": [1]});
        write(&mut row, "l.3", json!(4));
        assert_eq!(row, json!({"l": {"0": 1, "3": 4}}));
    }

    #[test]
    fn empty_path_write_uses_empty_key() {
        let mut row = json!({"a": 1});
        write(&mut row, "", json!(2));
        assert_eq!(row, json!({"a": 1, "": 2}));
        assert_eq!(read(&row, ""), None);
        unset(&mut row, "");
        assert_eq!(row, json!({"a": 1}));
    }

    #[test]
    fn empty_path_integrate_and_cast_are_ignored() {
        let mut row = json!({"a": 1});
        integrate(&mut row, "", json!({"a": 2, "b": 3}));
        cast(&mut row, "", CastKind::String);
        assert_eq!(row, json!({"a": 1}));
    }

    #[test]
    fn integrate_is_left_biased() {
        let mut row = json!({"m": {"a": 1}});
        integrate(&mut row, "m", json!({"a": 2, "b": 3}));
        assert_eq!(row, json!({"m": {"a": 1, "b": 3}}));

        let mut existing = json!({"a": 1});
        union(&mut existing, json!({"a": 2, "b": 3}));
        assert_eq!(existing, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn integrate_is_one_level_only() {
        let mut row = json!({"m": {"a": {"x": 1}}});
        integrate(&mut row, "m", json!({"a": {"y": 2}}));
        assert_eq!(row, json!({"m": {"a": {"x": 1}}}));
    }

    #[test]
    fn integrate_replaces_scalars_and_fills_missing() {
        let mut row = json!({"a": 1});
        integrate(&mut row, "a", json!({"b": 2}));
        integrate(&mut row, "c.d", json!(3));
        assert_eq!(row, json!({"a": {"b": 2}, "c": {"d": 3}}));
    }

    #[test]
    fn integrate_arrays_by_position() {
        let mut row = json!({"l": [1, 2]});
        integrate(&mut row, "l", json!([9, 9, 3]));
        assert_eq!(row, json!({"l": [1, 2, 3]}));
    }

    #[test]
    fn unset_then_read_is_none() {
        let mut row = json!({"a": {"b": 1, "c": 2}, "l": [1, 2, 3]});
        for path in ["a.b", "l.2", "l.0", "a"] {
            assert!(read(&row, path).is_some());
            unset(&mut row, path);
            assert_eq!(read(&row, path), None, "path {path}");
        }
        assert_eq!(row, json!({"l": {"1": 2}}));
    }

    #[test]
    fn unset_missing_is_a_no_op() {
        let mut row = json!({"a": {"b": 1}});
        unset(&mut row, "a.x");
        unset(&mut row, "x.y.z");
        unset(&mut row, "a.b.c");
        assert_eq!(row, json!({"a": {"b": 1}}));
    }

    #[test]
    fn unset_out_of_range_index_is_a_no_op() {
        let mut row = json!({"l": [1, 2]});
        unset(&mut row, "l.18446744073709551615");
        unset(&mut row, "l.2");
        assert_eq!(row, json!({"l": [1, 2]}));

        let mut empty = json!({"l": []});
        unset(&mut empty, "l.0");
        assert_eq!(empty, json!({"l": []}));
    }

    #[test]
    fn unset_keeps_key_order() {
        let mut row = json!({"a": 1, "b": 2, "c": 3});
        unset(&mut row, "a");
        let keys: Vec<&String> = row.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn cast_in_place() {
        let mut row = json!({"a": {"n": "12"}});
        cast(&mut row, "a.n", CastKind::Integer);
        cast(&mut row, "a.missing", CastKind::Integer);
        assert_eq!(row, json!({"a": {"n": 12}}));
    }

    #[test]
    fn valid_path_check() {
        assert!(require_valid_path("a.b").is_ok());
        for bad in ["", ".", "a..b", "a."] {
            assert!(matches!(require_valid_path(bad), Err(Error::MalformedPath(_))));
        }
    }
}
