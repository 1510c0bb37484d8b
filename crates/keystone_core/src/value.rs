//! Helpers over the document value model.
//!
//! Documents are `serde_json::Value` trees with insertion-ordered mappings
//! (the `preserve_order` feature); evaluation order and plan output both
//! depend on that ordering.

use serde_json::Value;

/// An insertion-ordered string-keyed mapping of document values
pub type ValueMap = serde_json::Map<String, Value>;

/// Human-readable kind of a value, used in format errors.
#[must_use]
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Interpret a value as a sequence of strings.
///
/// Returns `None` when the value is not a sequence or any entry is not a
/// string.
#[must_use]
pub fn string_seq(value: &Value) -> Option<Vec<String>> {
    let seq = value.as_array()?;
    seq.iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}
