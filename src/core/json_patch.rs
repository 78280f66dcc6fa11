//! Top-level key updates on JSON documents

use crate::error::{ArchiveError, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

/// Serialize `value` with `indent` spaces per level
pub fn to_pretty(value: &Value, indent: usize) -> Result<String> {
    let indent = " ".repeat(indent);
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| ArchiveError::Encoding(e.to_string()))
}

/// Set `key` at the top level of the object in `text` to `value`
///
/// Nested paths are not traversed: a key containing dots is a single key.
///
/// Text that does not parse as JSON fails with [`ArchiveError::Json`]; a
/// well-formed document whose top level is not an object fails with
/// [`ArchiveError::TypeMismatch`].
///
/// ```
/// use crudearch::json_patch::update_value;
/// use serde_json::json;
///
/// let out = update_value(r#"{"a":1,"b":2}"#, "b", json!(3), 2).unwrap();
/// let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
/// assert_eq!(parsed, json!({"a": 1, "b": 3}));
/// ```
pub fn update_value(text: &str, key: &str, value: Value, indent: usize) -> Result<String> {
    let mut object: Map<String, Value> = match serde_json::from_str(text)? {
        Value::Object(object) => object,
        other => {
            return Err(ArchiveError::TypeMismatch(format!(
                "expected a JSON object, found {}",
                kind(&other)
            )))
        }
    };
    object.insert(key.to_string(), value);
    to_pretty(&Value::Object(object), indent)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
