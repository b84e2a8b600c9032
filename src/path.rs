//! Dot-separated field paths over [`Record`] values.
//!
//! Lookups fan out over arrays (every match counts); modifiers use "first match"
//! semantics. Key comparison is exact first, then falls back to [`normalize_name`] so
//! that `DestChainSelector`, `destChainSelector` and `dest_chain_selector` all match.

use serde_json::{Map, Value};

use crate::types::Record;

pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Lowercase with underscores stripped.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// `snake_case` / `camelCase` to `PascalCase`.
pub fn to_pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if c == '_' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub fn get_key<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    let wanted = normalize_name(key);
    map.iter()
        .find(|(k, _)| normalize_name(k) == wanted)
        .map(|(_, v)| v)
}

pub(crate) fn find_key(map: &Map<String, Value>, key: &str) -> Option<String> {
    if map.contains_key(key) {
        return Some(key.to_string());
    }
    let wanted = normalize_name(key);
    map.keys().find(|k| normalize_name(k) == wanted).cloned()
}

/// Every value reachable at `path`, fanning out over intermediate arrays. A trailing
/// array is returned as a single value. Absent segments and nulls contribute nothing.
pub fn get_all<'a>(record: &'a Record, path: &str) -> Vec<&'a Value> {
    let mut current = vec![record];
    for segment in segments(path) {
        let mut next = Vec::new();
        for value in current {
            collect_segment(value, segment, &mut next);
        }
        current = next;
    }
    current.retain(|v| !v.is_null());
    current
}

fn collect_segment<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(v) = get_key(map, segment) {
                out.push(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        _ => {}
    }
}

/// Like [`get_all`] but a trailing array is flattened into its elements too.
pub fn get_all_flat<'a>(record: &'a Record, path: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for value in get_all(record, path) {
        flatten_into(value, &mut out);
    }
    out
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_into(item, out)),
        Value::Null => {}
        other => out.push(other),
    }
}

/// First value at `path`; arrays along the way resolve to their first matching element.
pub fn get_first<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    get_all(record, path).into_iter().next()
}

/// Insert `value` at `path`, creating intermediate objects. Returns `false` when an
/// intermediate segment exists but is not an object.
pub fn insert(record: &mut Record, path: &str, value: Value) -> bool {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *record = value;
        return true;
    };
    if record.is_null() {
        *record = Value::Object(Map::new());
    }
    let mut current = record;
    for part in parents {
        let Value::Object(map) = current else {
            return false;
        };
        let key = find_key(map, part).unwrap_or_else(|| (*part).to_string());
        current = map
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let Value::Object(map) = current else {
        return false;
    };
    let key = find_key(map, last).unwrap_or_else(|| (*last).to_string());
    map.insert(key, value);
    true
}
