//! Record helpers shared by adapters and the response assembler
//!
//! Records are JSON objects; nested objects and arrays model related data.

use serde_json::Value;

/// One row of a result set
pub type Record = Value;

/// Resolve a dotted path (`user.name`) against a record
///
/// Only the first element of an array is followed; use [`values_at_path`] when
/// every element matters.
pub fn value_at_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.first()?.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a dotted path, fanning out over arrays
pub fn values_at_path<'a>(record: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![record];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => next.extend(items.iter().filter_map(|v| v.get(segment))),
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Whether resolving a dotted path steps through an array (a to-many relation)
pub fn crosses_array(record: &Value, path: &str) -> bool {
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return false,
            },
            Value::Array(_) => return true,
            _ => return false,
        };
    }
    false
}

/// Text form of a scalar, the way it compares against request input
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

/// Whether a runtime value carries nothing to act on
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_blank),
        _ => false,
    }
}
