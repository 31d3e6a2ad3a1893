/// Rendering of result rows as tables and JSON

use base64::{engine::general_purpose::STANDARD, Engine as _};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use sdbsql_api::Value;
use serde_json::{Map, Value as JsonValue};

/// Format rows as a table with one column per select-list entry
pub fn format_rows_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    if rows.is_empty() {
        return "No rows found".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());

    for row in rows {
        table.add_row(row.iter().map(|v| Cell::new(format_value(v))).collect::<Vec<_>>());
    }

    table.to_string()
}

/// Format a value for a table cell
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => ts.to_rfc3339(),
        Value::Binary(bytes) => format!("<Binary {} bytes>", bytes.len()),
    }
}

/// Convert one row to a JSON object keyed by column name
pub fn row_to_json(columns: &[String], row: &[Value]) -> JsonValue {
    let mut object = Map::new();
    for (column, value) in columns.iter().zip(row) {
        object.insert(column.clone(), value_to_json(value));
    }
    JsonValue::Object(object)
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Int(n) => JsonValue::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        Value::Binary(bytes) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_empty_rows() {
        assert_eq!(format_rows_table(&columns(&["id"]), &[]), "No rows found");
    }

    #[test]
    fn test_format_rows() {
        let rows = vec![
            vec![Value::from("ID1"), Value::from("Alice"), Value::Int(30)],
            vec![Value::from("ID2"), Value::from("Bob"), Value::Null],
        ];
        let output = format_rows_table(&columns(&["id", "name", "age"]), &rows);

        assert!(output.contains("Alice"));
        assert!(output.contains("Bob"));
        assert!(output.contains("30"));
        assert!(output.contains("null"));
        assert!(output.contains("name"));
    }

    #[test]
    fn test_format_value_types() {
        assert_eq!(format_value(&Value::from("test")), "test");
        assert_eq!(format_value(&Value::Float(1.5)), "1.5");
        assert_eq!(format_value(&Value::Bool(false)), "false");
        assert_eq!(format_value(&Value::binary(vec![1u8, 2, 3])), "<Binary 3 bytes>");
        let ts = Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(format_value(&Value::Timestamp(ts)), "2020-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_row_to_json() {
        let json = row_to_json(
            &columns(&["id", "n", "bin"]),
            &[Value::from("k"), Value::Int(7), Value::binary(vec![0u8, 1])],
        );
        assert_eq!(json["id"], "k");
        assert_eq!(json["n"], 7);
        assert_eq!(json["bin"], "AAE=");
    }
}
