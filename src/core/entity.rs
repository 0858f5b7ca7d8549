//! Purpose: Schema-less entity model and the value normalizer.
//! Exports: `Entity`, `Property`, `PropertyValue`, `KeyRef`, `export_value`.
//! Role: Canonical in-memory shape between the wire decoder and the writers.
//! Invariants: Normalization is total; no input produces an error.
//! Invariants: Normalized output contains no backend types; references are strings.
//! Invariants: Property order is preserved end to end (maps keep insertion order).
use serde_json::{Map, Value};

/// Leaf path element of a Datastore key. Exactly one of `name`/`id` is set
/// for real keys; both absent decodes as the zero id.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyRef {
    pub kind: String,
    pub name: Option<String>,
    pub id: Option<i64>,
}

impl KeyRef {
    /// Human-readable identifier: the name when non-empty, else the decimal id.
    pub fn display_id(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.unwrap_or(0).to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Timestamp(String),
    Blob(String),
    GeoPoint { latitude: f64, longitude: f64 },
    Reference(KeyRef),
    Nested(Vec<Property>),
    Array(Vec<PropertyValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One schema-less record: named properties in source order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entity {
    pub properties: Vec<Property>,
}

impl Entity {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    /// Normalize into a plain JSON object. Null-valued properties are omitted
    /// entirely rather than written as JSON null.
    pub fn export_record(&self) -> Map<String, Value> {
        properties_to_map(&self.properties)
    }
}

fn properties_to_map(properties: &[Property]) -> Map<String, Value> {
    let mut map = Map::new();
    for property in properties {
        if matches!(property.value, PropertyValue::Null) {
            continue;
        }
        map.insert(property.name.clone(), export_value(&property.value));
    }
    map
}

/// Normalize one raw property value into a plain JSON tree.
///
/// Nested entities become objects (null fields omitted), references collapse
/// to their name-or-id string, arrays drop null elements, scalars pass
/// through. Total over the input domain; unrecognized shapes are rendered
/// best-effort, never rejected.
pub fn export_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Bool(flag) => Value::Bool(*flag),
        PropertyValue::Integer(number) => Value::from(*number),
        PropertyValue::Double(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(number.to_string())),
        PropertyValue::Text(text) => Value::String(text.clone()),
        PropertyValue::Timestamp(stamp) => Value::String(stamp.clone()),
        PropertyValue::Blob(bytes) => Value::String(bytes.clone()),
        PropertyValue::GeoPoint {
            latitude,
            longitude,
        } => {
            let mut point = Map::new();
            point.insert("latitude".to_string(), Value::from(*latitude));
            point.insert("longitude".to_string(), Value::from(*longitude));
            Value::Object(point)
        }
        PropertyValue::Reference(key) => Value::String(key.display_id()),
        PropertyValue::Nested(properties) => Value::Object(properties_to_map(properties)),
        PropertyValue::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !matches!(item, PropertyValue::Null))
                .map(export_value)
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, KeyRef, Property, PropertyValue, export_value};
    use serde_json::{Value, json};

    fn key(name: Option<&str>, id: Option<i64>) -> KeyRef {
        KeyRef {
            kind: "Thing".to_string(),
            name: name.map(str::to_string),
            id,
        }
    }

    #[test]
    fn reference_prefers_name_over_id() {
        let value = export_value(&PropertyValue::Reference(key(Some("alpha"), Some(7))));
        assert_eq!(value, Value::String("alpha".to_string()));
    }

    #[test]
    fn reference_with_empty_name_uses_decimal_id() {
        let value = export_value(&PropertyValue::Reference(key(Some(""), Some(42))));
        assert_eq!(value, Value::String("42".to_string()));

        let value = export_value(&PropertyValue::Reference(key(None, Some(42))));
        assert_eq!(value, Value::String("42".to_string()));
    }

    #[test]
    fn null_properties_are_omitted() {
        let entity = Entity::new(vec![
            Property::new("present", PropertyValue::Text("x".to_string())),
            Property::new("absent", PropertyValue::Null),
        ]);
        let record = entity.export_record();
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("present"));
        assert!(!record.contains_key("absent"));
    }

    #[test]
    fn nested_entities_drop_null_fields_recursively() {
        let nested = PropertyValue::Nested(vec![
            Property::new("kept", PropertyValue::Integer(1)),
            Property::new("dropped", PropertyValue::Null),
        ]);
        assert_eq!(export_value(&nested), json!({ "kept": 1 }));
    }

    #[test]
    fn arrays_skip_null_elements() {
        let array = PropertyValue::Array(vec![
            PropertyValue::Integer(1),
            PropertyValue::Null,
            PropertyValue::Integer(3),
        ]);
        assert_eq!(export_value(&array), json!([1, 3]));
    }

    #[test]
    fn record_preserves_property_order() {
        let entity = Entity::new(vec![
            Property::new("b", PropertyValue::Integer(2)),
            Property::new("a", PropertyValue::Integer(1)),
            Property::new("c", PropertyValue::Integer(3)),
        ]);
        let record = entity.export_record();
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn non_finite_double_renders_as_string() {
        let value = export_value(&PropertyValue::Double(f64::NAN));
        assert!(matches!(value, Value::String(_)));
    }
}
