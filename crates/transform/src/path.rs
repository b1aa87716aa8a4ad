//! Dotted-path access into nested JSON values.
//!
//! A missing intermediate resolves to `None` rather than an error; writes
//! create intermediate objects as needed. Numeric segments index into
//! arrays on read.

use serde_json::{Map, Value};

/// Read `path` ("a.b.c") out of `value`. Missing segments yield `None`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `new_value` into `target` at `path`, creating intermediate
/// objects as needed. Non-object intermediates are replaced.
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    let mut current = target;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
