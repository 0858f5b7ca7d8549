//! Purpose: Flatten normalized records into (path, scalar) pairs for CSV rows.
//! Exports: `FlatField`, `flatten`, `header`, `render`.
//! Role: Shared traversal behind CSV header derivation and row encoding.
//! Invariants: Traversal descends into maps only; sequences stay opaque leaves.
//! Invariants: Paths compose ancestor-first, joined with `:`.
//! Invariants: Field order follows the record's own order, depth-first.
use serde_json::{Map, Value};

/// One flattened leaf: the colon-joined path and a borrowed scalar value.
#[derive(Debug, PartialEq)]
pub struct FlatField<'a> {
    pub path: String,
    pub value: &'a Value,
}

/// Depth-first flattening of a normalized record. A leaf is anything that is
/// not a map; arrays are emitted whole under their own key.
pub fn flatten(record: &Map<String, Value>) -> Vec<FlatField<'_>> {
    let mut fields = Vec::new();
    walk(record, None, &mut fields);
    fields
}

/// Column paths for a record, in the same order `flatten` emits values.
pub fn header(record: &Map<String, Value>) -> Vec<String> {
    flatten(record).into_iter().map(|field| field.path).collect()
}

fn walk<'a>(map: &'a Map<String, Value>, prefix: Option<&str>, out: &mut Vec<FlatField<'a>>) {
    for (name, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.clone(),
        };
        match value {
            Value::Object(nested) => walk(nested, Some(&path), out),
            leaf => out.push(FlatField { path, value: leaf }),
        }
    }
}

/// Scalar text for one CSV cell. Strings are taken verbatim, null renders as
/// the empty string, anything else falls back to compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
