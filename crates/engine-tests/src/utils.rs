use connectors::store::memory::MemoryStore;
use model::{core::table::TableRef, records::record::Record};
use serde_json::Value;

pub fn rec(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Rows of `table` as JSON values, sorted by their serialized form so
/// comparisons do not depend on key generation order.
pub fn stored(store: &MemoryStore, table: &TableRef) -> Vec<Value> {
    let mut rows: Vec<Value> = store.rows(table).into_iter().map(Value::Object).collect();
    rows.sort_by_key(|v| v.to_string());
    rows
}

pub fn assert_rows(store: &MemoryStore, table: &TableRef, expected: Vec<Value>) {
    let mut expected = expected;
    expected.sort_by_key(|v| v.to_string());
    assert_eq!(stored(store, table), expected, "rows of {table}");
}

/// JSON array of `n` objects `{"id": i, "name": "row-i"}`.
pub fn json_rows(n: usize) -> String {
    let rows: Vec<String> = (0..n)
        .map(|i| format!(r#"{{"id":{i},"name":"row-{i}"}}"#))
        .collect();
    format!("[{}]", rows.join(",\n"))
}
