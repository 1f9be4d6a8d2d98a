//! Loosely-typed records as produced by source adapters.

use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// One domain entity (shelter, outage, incident): field name to scalar value.
pub type Record = Map<String, Value>;

/// Look up the first alias present on the record with a non-null value.
pub fn field<'a, S: AsRef<str>>(record: &'a Record, aliases: &[S]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| record.get(alias.as_ref()))
        .find(|value| !value.is_null())
}

/// Same as [`field`], rendered as display text.
pub fn field_text<S: AsRef<str>>(record: &Record, aliases: &[S]) -> Option<String> {
    field(record, aliases).map(value_text)
}

/// Render a JSON value the way it should appear in a message.
///
/// Strings are shown without quotes; `null` renders empty.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Interpret a snapshot payload as a list of records.
pub fn records_of(value: &Value) -> Result<Vec<Record>> {
    let items = value
        .as_array()
        .ok_or_else(|| AppError::validation("snapshot is not a list of records"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object()
                .cloned()
                .ok_or_else(|| AppError::validation(format!("snapshot item {i} is not an object")))
        })
        .collect()
}

/// Content-based snapshot equality.
///
/// A top-level record list compares as a multiset so a re-ordered fetch of
/// the same records is not reported as a change. Everything below the top
/// level, and any non-list document, compares structurally: nested arrays
/// such as `html_lines` are ordered content.
pub fn snapshots_equal(previous: &Value, current: &Value) -> bool {
    match (previous, current) {
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut left: Vec<String> = a.iter().map(Value::to_string).collect();
            let mut right: Vec<String> = b.iter().map(Value::to_string).collect();
            left.sort_unstable();
            right.sort_unstable();
            left == right
        }
        _ => previous == current,
    }
}
