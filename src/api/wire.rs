//! Purpose: Decode Datastore REST v1 JSON into the entity model.
//! Exports: `entity_from_wire`, `value_from_wire`, `key_leaf`.
//! Role: Glue between the typed-value wire encoding and `core::entity`.
//! Invariants: Decoding is best-effort and total; unknown value shapes become
//! Null with a debug log, never an error.
//! Invariants: Property order follows the wire object order.
use serde_json::Value;
use tracing::debug;

use crate::core::entity::{Entity, KeyRef, Property, PropertyValue};

/// Decode one wire entity (`{"key": ..., "properties": {...}}`).
pub fn entity_from_wire(entity: &Value) -> Entity {
    let mut properties = Vec::new();
    if let Some(map) = entity.get("properties").and_then(Value::as_object) {
        for (name, value) in map {
            properties.push(Property::new(name.clone(), value_from_wire(value)));
        }
    }
    Entity::new(properties)
}

/// Decode one typed value object. Datastore encodes the type as the sole
/// significant key (`stringValue`, `integerValue`, ...); `excludeFromIndexes`
/// and `meaning` ride along and are ignored.
pub fn value_from_wire(value: &Value) -> PropertyValue {
    let Some(map) = value.as_object() else {
        debug!("non-object wire value; decoding as null");
        return PropertyValue::Null;
    };

    if map.contains_key("nullValue") {
        return PropertyValue::Null;
    }
    if let Some(flag) = map.get("booleanValue").and_then(Value::as_bool) {
        return PropertyValue::Bool(flag);
    }
    if let Some(number) = map.get("integerValue") {
        // Wire int64s arrive as decimal strings; numbers appear from emulators.
        if let Some(parsed) = number
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .or_else(|| number.as_i64())
        {
            return PropertyValue::Integer(parsed);
        }
    }
    if let Some(number) = map.get("doubleValue").and_then(Value::as_f64) {
        return PropertyValue::Double(number);
    }
    if let Some(text) = map.get("stringValue").and_then(Value::as_str) {
        return PropertyValue::Text(text.to_string());
    }
    if let Some(stamp) = map.get("timestampValue").and_then(Value::as_str) {
        return PropertyValue::Timestamp(stamp.to_string());
    }
    if let Some(bytes) = map.get("blobValue").and_then(Value::as_str) {
        return PropertyValue::Blob(bytes.to_string());
    }
    if let Some(key) = map.get("keyValue") {
        return PropertyValue::Reference(key_leaf(key));
    }
    if let Some(entity) = map.get("entityValue") {
        return PropertyValue::Nested(entity_from_wire(entity).properties);
    }
    if let Some(array) = map.get("arrayValue") {
        let items = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(value_from_wire).collect())
            .unwrap_or_default();
        return PropertyValue::Array(items);
    }
    if let Some(point) = map.get("geoPointValue") {
        return PropertyValue::GeoPoint {
            latitude: point.get("latitude").and_then(Value::as_f64).unwrap_or(0.0),
            longitude: point.get("longitude").and_then(Value::as_f64).unwrap_or(0.0),
        };
    }

    debug!("unrecognized wire value tag; decoding as null");
    PropertyValue::Null
}

/// Leaf path element of a wire key. Ids arrive as decimal strings.
pub fn key_leaf(key: &Value) -> KeyRef {
    let Some(element) = key
        .get("path")
        .and_then(Value::as_array)
        .and_then(|path| path.last())
    else {
        return KeyRef::default();
    };
    KeyRef {
        kind: element
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        name: element
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        id: element
            .get("id")
            .and_then(|id| id.as_str().and_then(|raw| raw.parse::<i64>().ok()).or_else(|| id.as_i64())),
    }
}
