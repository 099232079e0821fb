// src/utils/serialization.rs
//! Serialization utilities for the registry.
//!
//! Provides plain JSON helpers plus the canonical JSON form that audit
//! digests are computed over.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serializes a value to a JSON string.
///
/// # Arguments
/// * `data` - The value to serialize (must implement `Serialize`)
///
/// # Returns
/// - `Ok(String)` with JSON representation on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
///
/// # Arguments
/// * `data` - JSON string to deserialize
///
/// # Returns
/// - `Ok(T)` with deserialized value on success
/// - `Err(serde_json::Error)` if deserialization fails
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Renders `value` as canonical JSON.
///
/// Object keys are emitted in lexicographic order at every depth, `null`
/// members are dropped and no insignificant whitespace is written, so two
/// values holding the same logical fields always render identically no
/// matter how they were built.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                let member = &map[key];
                if member.is_null() {
                    continue;
                }
                sorted.insert(key.clone(), canonicalize(member));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
