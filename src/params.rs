//! Lenient typed lookups over plugin-style JSON parameters.
//!
//! A parameter of the wrong type is reported and treated as absent so one typo does not
//! disable a whole configuration.

use std::collections::HashMap;

use serde_json::{Map, Value};

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn ignore(config_name: &str, key: &str, expected: &str, found: &Value) {
    log::warn!(
        "config `{}`: ignoring param `{}`: expected {}, found {}",
        config_name,
        key,
        expected,
        type_name(found)
    );
}

pub(crate) fn object_param<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    config_name: &str,
) -> Option<&'a Map<String, Value>> {
    match obj.get(key)? {
        Value::Object(inner) => Some(inner),
        other => {
            ignore(config_name, key, "object", other);
            None
        }
    }
}

pub(crate) fn string_param(
    obj: &Map<String, Value>,
    key: &str,
    config_name: &str,
) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        other => {
            ignore(config_name, key, "string", other);
            None
        }
    }
}

pub(crate) fn bool_param(obj: &Map<String, Value>, key: &str, config_name: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        other => {
            ignore(config_name, key, "bool", other);
            None
        }
    }
}

/// Reads a `{string: string}` object. Any non-string value discards the whole parameter.
pub(crate) fn string_map_param(
    obj: &Map<String, Value>,
    key: &str,
    config_name: &str,
) -> Option<HashMap<String, String>> {
    let inner = object_param(obj, key, config_name)?;
    let mut out = HashMap::with_capacity(inner.len());
    for (k, v) in inner {
        match v {
            Value::String(s) => {
                out.insert(k.clone(), s.clone());
            }
            other => {
                ignore(config_name, key, "map of strings", other);
                return None;
            }
        }
    }
    Some(out)
}
