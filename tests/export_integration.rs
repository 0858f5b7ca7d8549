// Driver-level integration tests for the export pipeline.
use std::cell::Cell;
use std::path::Path;

use serde_json::Value;

use dsadmin::core::entity::{Entity, KeyRef, Property, PropertyValue};
use dsadmin::core::error::Error;
use dsadmin::core::export::{EntitySource, ExportConfig, export_kind};
use dsadmin::core::writer::ExportFormat;

struct FakeSource {
    entities: Vec<Entity>,
    fetches: Cell<u64>,
}

impl FakeSource {
    fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            fetches: Cell::new(0),
        }
    }

    fn numbered(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|n| {
                    Entity::new(vec![
                        Property::new("index", PropertyValue::Integer(n as i64)),
                        Property::new("name", PropertyValue::Text(format!("record-{n}"))),
                    ])
                })
                .collect(),
        )
    }
}

impl EntitySource for FakeSource {
    fn fetch_page(
        &self,
        _kind: &str,
        _namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>, Error> {
        self.fetches.set(self.fetches.get() + 1);
        let start = (offset as usize).min(self.entities.len());
        let end = (start + limit as usize).min(self.entities.len());
        Ok(self.entities[start..end].to_vec())
    }
}

fn export(source: &FakeSource, dir: &Path, format: ExportFormat) -> std::path::PathBuf {
    let config = ExportConfig::new("Widget", format).with_out_dir(dir);
    export_kind(source, &config, |_| {}, |_| {})
        .expect("export")
        .path
}

fn parse_array(path: &Path) -> Vec<Value> {
    let body = std::fs::read_to_string(path).expect("read export");
    let parsed: Value = serde_json::from_str(&body).expect("valid json");
    parsed.as_array().expect("array").clone()
}

#[test]
fn json_round_trip_across_page_boundaries() {
    // Zero, one, exactly-one-page, and multi-page datasets.
    for (count, expected_fetches) in [(0usize, 1u64), (1, 2), (1000, 2), (1001, 3)] {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = FakeSource::numbered(count);
        let path = export(&source, temp.path(), ExportFormat::Json);
        let records = parse_array(&path);
        assert_eq!(records.len(), count, "dataset of {count}");
        assert_eq!(
            source.fetches.get(),
            expected_fetches,
            "fetch rounds for {count}"
        );
        if count > 0 {
            assert_eq!(records[count - 1]["index"], (count - 1) as u64);
        }
    }
}

#[test]
fn csv_header_and_rows_share_column_count() {
    let temp = tempfile::tempdir().expect("tempdir");
    let entities: Vec<Entity> = (0..5)
        .map(|n| {
            Entity::new(vec![
                Property::new("name", PropertyValue::Text(format!("w{n}"))),
                Property::new(
                    "address",
                    PropertyValue::Nested(vec![
                        Property::new("city", PropertyValue::Text("Berlin".to_string())),
                        Property::new("zip", PropertyValue::Text("10115".to_string())),
                    ]),
                ),
            ])
        })
        .collect();
    let source = FakeSource::new(entities);
    let path = export(&source, temp.path(), ExportFormat::Csv);

    let body = std::fs::read_to_string(&path).expect("read export");
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "name,address:city,address:zip");
    let columns = lines[0].split(',').count();
    for row in &lines[1..] {
        assert_eq!(row.split(',').count(), columns);
    }
}

#[test]
fn repeated_exports_are_byte_identical() {
    let source = FakeSource::numbered(25);
    let temp_a = tempfile::tempdir().expect("tempdir");
    let temp_b = tempfile::tempdir().expect("tempdir");
    let first = export(&source, temp_a.path(), ExportFormat::Json);
    let second = export(&source, temp_b.path(), ExportFormat::Json);
    let body_a = std::fs::read(&first).expect("read first");
    let body_b = std::fs::read(&second).expect("read second");
    assert_eq!(body_a, body_b);
}

#[test]
fn references_and_nulls_normalize_through_the_full_pipeline() {
    let temp = tempfile::tempdir().expect("tempdir");
    let source = FakeSource::new(vec![Entity::new(vec![
        Property::new(
            "owner",
            PropertyValue::Reference(KeyRef {
                kind: "Owner".to_string(),
                name: Some(String::new()),
                id: Some(42),
            }),
        ),
        Property::new("nothing", PropertyValue::Null),
        Property::new(
            "tags",
            PropertyValue::Array(vec![
                PropertyValue::Text("a".to_string()),
                PropertyValue::Null,
                PropertyValue::Text("b".to_string()),
            ]),
        ),
    ])]);
    let path = export(&source, temp.path(), ExportFormat::Json);
    let records = parse_array(&path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["owner"], "42");
    assert!(records[0].get("nothing").is_none());
    assert_eq!(records[0]["tags"], serde_json::json!(["a", "b"]));
}

#[test]
fn null_fields_contribute_no_csv_column() {
    let temp = tempfile::tempdir().expect("tempdir");
    let source = FakeSource::new(vec![Entity::new(vec![
        Property::new("kept", PropertyValue::Integer(1)),
        Property::new("dropped", PropertyValue::Null),
    ])]);
    let path = export(&source, temp.path(), ExportFormat::Csv);
    let body = std::fs::read_to_string(&path).expect("read export");
    assert_eq!(body.lines().next(), Some("kept"));
}
