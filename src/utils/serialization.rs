// src/utils/serialization.rs
//! JSON helpers shared by the envelope codec and the certificate models.
//!
//! Signed payloads are compact JSON objects. The same object must always
//! serialize to the same text, because recorded signatures are re-verified
//! against a re-serialization of the record.

use crate::error::{NametagError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Serializes a value to compact JSON text.
///
/// # Returns
/// - `Ok(String)` with the JSON representation
/// - `Err(MalformedEnvelope)` if serialization fails (e.g. non-string map keys)
pub fn to_json_text<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| NametagError::malformed(format!("cannot serialize payload: {e}")))
}

/// Parses JSON text that must hold an object.
///
/// Floats parse to the exact value they were printed from, so a payload
/// re-serializes to the text that was signed.
///
/// # Returns
/// - `Ok(Map)` for a JSON object
/// - `Err(MalformedEnvelope)` for invalid JSON or any non-object value
pub fn parse_object(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(NametagError::malformed(format!(
            "payload is JSON but not an object: {}",
            kind_of(&other)
        ))),
        Err(e) => Err(NametagError::malformed(format!("payload is not valid JSON: {e}"))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
