//! Record transformations between on-chain and off-chain shapes.
//!
//! Modifier lists are declared on-chain → off-chain. Output pipelines run them left to
//! right over decoded records. Input pipelines run the inverse of each modifier right to
//! left over caller parameters before anything is encoded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::path;
use crate::types::{Address, Record};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ElementPosition {
    First,
    Middle,
    Last,
}

impl ElementPosition {
    fn pick(self, items: &[Value]) -> Option<&Value> {
        let index = match self {
            Self::First => 0,
            Self::Middle => items.len() / 2,
            Self::Last => items.len().checked_sub(1)?,
        };
        items.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modifier {
    /// On-chain field name (or dotted path) → off-chain name.
    Rename { fields: BTreeMap<String, String> },
    /// Replace the record with the value at `path`.
    PropertyExtract { path: String },
    /// Replace the array at `path` with one of its elements.
    ElementExtract {
        path: String,
        position: ElementPosition,
    },
    /// Nest the value at `from` under a new key `to`. An empty `from` wraps the whole record.
    Wrap { from: String, to: String },
    HardCode {
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        on_chain: BTreeMap<String, Value>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        off_chain: BTreeMap<String, Value>,
    },
    Drop { fields: Vec<String> },
    /// Write the address the read was bound to into `field` (empty: the whole value).
    ResponseAddressOverride {
        #[serde(default)]
        field: String,
    },
}

impl Modifier {
    pub fn rename(pairs: &[(&str, &str)]) -> Self {
        Self::Rename {
            fields: pairs
                .iter()
                .map(|(on, off)| ((*on).to_string(), (*off).to_string()))
                .collect(),
        }
    }

    pub fn property_extract(path: &str) -> Self {
        Self::PropertyExtract {
            path: path.to_string(),
        }
    }

    pub fn element_extract(path: &str, position: ElementPosition) -> Self {
        Self::ElementExtract {
            path: path.to_string(),
            position,
        }
    }

    pub fn wrap(from: &str, to: &str) -> Self {
        Self::Wrap {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn hard_code_off_chain(values: &[(&str, Value)]) -> Self {
        Self::HardCode {
            on_chain: BTreeMap::new(),
            off_chain: values
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    pub fn drop_fields(fields: &[&str]) -> Self {
        Self::Drop {
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    pub fn response_address(field: &str) -> Self {
        Self::ResponseAddressOverride {
            field: field.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::PropertyExtract { path } | Self::ElementExtract { path, .. }
                if path.is_empty() =>
            {
                Err(Error::config(format!("{self:?}: path must not be empty")))
            }
            Self::Wrap { to, .. } if to.is_empty() => {
                Err(Error::config("wrap modifier needs a target field"))
            }
            Self::Rename { fields } if fields.iter().any(|(k, v)| k.is_empty() || v.is_empty()) => {
                Err(Error::config("rename modifier has an empty field name"))
            }
            _ => Ok(()),
        }
    }

    fn apply_output(&self, record: Record, response_address: Option<&Address>) -> Result<Record, Error> {
        let mut record = record;
        match self {
            Self::Rename { fields } => {
                for (on_chain, off_chain) in fields {
                    rename(&mut record, on_chain, off_chain);
                }
            }
            Self::PropertyExtract { path } => {
                let parts: Vec<&str> = path::segments(path).collect();
                record = extract(&record, &parts).ok_or_else(|| {
                    Error::codec(format!("property {path} not found in decoded record"))
                })?;
            }
            Self::ElementExtract { path, position } => {
                let (parent, last) = split_parent(path);
                visit_objects(&mut record, &parent, &mut |map| {
                    if let Some(key) = path::find_key(map, last)
                        && let Some(Value::Array(items)) = map.get(&key)
                    {
                        let picked = position.pick(items).cloned().unwrap_or(Value::Null);
                        map.insert(key, picked);
                    }
                });
            }
            Self::Wrap { from, to } => {
                if from.is_empty() {
                    record = wrap_value(to, record);
                } else {
                    let (parent, last) = split_parent(from);
                    visit_objects(&mut record, &parent, &mut |map| {
                        if let Some(key) = path::find_key(map, last)
                            && let Some(value) = map.remove(&key)
                        {
                            map.insert(key, wrap_value(to, value));
                        }
                    });
                }
            }
            Self::HardCode { off_chain, .. } => hard_code(&mut record, off_chain),
            Self::Drop { fields } => {
                for field in fields {
                    let (parent, last) = split_parent(field);
                    visit_objects(&mut record, &parent, &mut |map| {
                        if let Some(key) = path::find_key(map, last) {
                            map.remove(&key);
                        }
                    });
                }
            }
            Self::ResponseAddressOverride { field } => {
                if let Some(address) = response_address {
                    let value = Value::String(address.to_string());
                    if field.is_empty() {
                        record = value;
                    } else {
                        for_each_record(&mut record, &mut |r| {
                            path::insert(r, field, value.clone());
                        });
                    }
                }
            }
        }
        Ok(record)
    }

    fn apply_input(&self, record: Record) -> Record {
        let mut record = record;
        match self {
            Self::Rename { fields } => {
                for (on_chain, off_chain) in fields {
                    let (parent, on_name) = split_parent(on_chain);
                    let off_path = if parent.is_empty() {
                        off_chain.clone()
                    } else {
                        format!("{}.{off_chain}", parent.join("."))
                    };
                    rename(&mut record, &off_path, on_name);
                }
            }
            Self::PropertyExtract { path } => {
                let mut wrapped = Value::Object(Map::new());
                path::insert(&mut wrapped, path, record);
                record = wrapped;
            }
            Self::ElementExtract { path, .. } => {
                let (parent, last) = split_parent(path);
                visit_objects(&mut record, &parent, &mut |map| {
                    if let Some(key) = path::find_key(map, last)
                        && let Some(value) = map.remove(&key)
                    {
                        map.insert(key, Value::Array(vec![value]));
                    }
                });
            }
            Self::Wrap { from, to } => {
                if from.is_empty() {
                    if let Value::Object(mut map) = record {
                        record = path::find_key(&map, to)
                            .and_then(|key| map.remove(&key))
                            .unwrap_or(Value::Object(map));
                    }
                } else {
                    let (parent, last) = split_parent(from);
                    visit_objects(&mut record, &parent, &mut |map| {
                        if let Some(key) = path::find_key(map, last)
                            && let Some(Value::Object(inner)) = map.get_mut(&key)
                            && let Some(inner_key) = path::find_key(inner, to)
                            && let Some(value) = inner.remove(&inner_key)
                        {
                            map.insert(key, value);
                        }
                    });
                }
            }
            Self::HardCode { on_chain, .. } => hard_code(&mut record, on_chain),
            Self::Drop { .. } | Self::ResponseAddressOverride { .. } => {}
        }
        record
    }
}

/// Run an output pipeline over one decoded record.
pub fn apply_output(
    modifiers: &[Modifier],
    record: Record,
    response_address: Option<&Address>,
) -> Result<Record, Error> {
    modifiers
        .iter()
        .try_fold(record, |acc, m| m.apply_output(acc, response_address))
}

/// Run an input pipeline: inverses, last modifier first.
pub fn apply_input(modifiers: &[Modifier], record: Record) -> Record {
    modifiers
        .iter()
        .rev()
        .fold(record, |acc, m| m.apply_input(acc))
}

fn split_parent(path: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = path::segments(path).collect();
    let last = parts.pop().unwrap_or("");
    (parts, last)
}

fn wrap_value(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn rename(record: &mut Record, from: &str, to: &str) {
    let (parent, last) = split_parent(from);
    visit_objects(record, &parent, &mut |map| {
        if let Some(key) = path::find_key(map, last)
            && let Some(value) = map.remove(&key)
        {
            map.insert(to.to_string(), value);
        }
    });
}

fn hard_code(record: &mut Record, values: &BTreeMap<String, Value>) {
    for (field, value) in values {
        if field.is_empty() {
            *record = value.clone();
            continue;
        }
        for_each_record(record, &mut |r| {
            path::insert(r, field, value.clone());
        });
    }
}

fn for_each_record(record: &mut Record, f: &mut dyn FnMut(&mut Record)) {
    match record {
        Value::Array(items) => {
            for item in items {
                f(item);
            }
        }
        other => f(other),
    }
}

/// Call `f` on every object reached by `segments`, fanning out over arrays.
fn visit_objects(value: &mut Value, segments: &[&str], f: &mut dyn FnMut(&mut Map<String, Value>)) {
    match value {
        Value::Array(items) => {
            for item in items {
                visit_objects(item, segments, f);
            }
        }
        Value::Object(map) => match segments.split_first() {
            None => f(map),
            Some((head, rest)) => {
                if let Some(key) = path::find_key(map, head)
                    && let Some(child) = map.get_mut(&key)
                {
                    visit_objects(child, rest, f);
                }
            }
        },
        _ => {}
    }
}

/// Clone the value at `segments`. Crossing an array collects one result per element.
fn extract(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| extract(item, segments)).collect(),
        )),
        Value::Object(map) => extract(path::get_key(map, head)?, rest),
        _ => None,
    }
}
