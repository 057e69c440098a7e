//! Conversion between shape entries and Loro values.
//!
//! Shapes are stored as plain Loro map values (not nested containers): the
//! whole entry is replaced on every write, so there is nothing to gain from
//! per-field CRDT merging.

use crate::shapes::ShapeEntry;
use loro::LoroValue;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Convert a shape entry to a Loro value.
pub fn shape_to_loro(shape: &ShapeEntry) -> Result<LoroValue, serde_json::Error> {
    let value = serde_json::to_value(shape)?;
    Ok(json_to_loro(&value))
}

/// Convert a Loro value back to a shape entry.
///
/// Returns `None` for values that do not describe a shape.
pub fn shape_from_loro(value: &LoroValue) -> Option<ShapeEntry> {
    let json = loro_to_json(value);
    match serde_json::from_value::<ShapeEntry>(json) {
        Ok(shape) if !shape.id.is_empty() => Some(shape),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Skipping malformed shape entry: {}", e);
            None
        }
    }
}

/// Convert a JSON value to a Loro value.
///
/// Integers that fit in `i64` stay integers. Larger unsigned integers are
/// stored as 8 big-endian bytes, since Loro has no unsigned type; every other
/// number becomes a double.
pub fn json_to_loro(value: &Value) -> LoroValue {
    match value {
        Value::Null => LoroValue::Null,
        Value::Bool(b) => LoroValue::Bool(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => LoroValue::I64(i),
            (None, Some(u)) => LoroValue::Binary(u.to_be_bytes().to_vec().into()),
            _ => LoroValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => LoroValue::from(s.as_str()),
        Value::Array(items) => {
            LoroValue::from(items.iter().map(json_to_loro).collect::<Vec<LoroValue>>())
        }
        Value::Object(map) => LoroValue::from(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_loro(v)))
                .collect::<HashMap<String, LoroValue>>(),
        ),
    }
}

/// Convert a Loro value to a JSON value.
///
/// 8-byte binary values are unsigned integers written by [`json_to_loro`];
/// other binary values become byte arrays. Container references have no JSON
/// form and become `null`.
pub fn loro_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Null => Value::Null,
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::Double(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        LoroValue::I64(i) => Value::from(*i),
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::Binary(bytes) => match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(be) => Value::from(u64::from_be_bytes(be)),
            Err(_) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        },
        LoroValue::List(items) => Value::Array(items.iter().map(loro_to_json).collect()),
        LoroValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), loro_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        _ => Value::Null,
    }
}
