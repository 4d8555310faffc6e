//! Line-level helpers shared by every scan.

use std::io::{self, BufRead};

use serde_json::{Map, Value};

/// One stored record: a JSON object whose `id` field is owned by the store.
pub type Record = Map<String, Value>;

/// Name of the reserved id field.
pub const ID_FIELD: &str = "id";

/// The record's id. Integers and numeric strings are both accepted.
pub fn record_id(record: &Record) -> Option<u64> {
    match record.get(ID_FIELD)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_record(line: &[u8]) -> serde_json::Result<Record> {
    serde_json::from_slice(line)
}

/// Serialize a record to a single newline-terminated line.
pub(crate) fn encode_line(record: &Record) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

/// Read the next raw line into `buf`, returning the number of bytes
/// consumed (0 at end of file).
pub(crate) fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<u64> {
    buf.clear();
    let read = reader.read_until(b'\n', buf)?;
    Ok(read as u64)
}

/// Text a value contributes to a search match. Strings match on their
/// content; every other value, nested objects and arrays included, matches
/// on its compact JSON rendering.
pub(crate) fn searchable_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        assert_eq!(record_id(&rec(json!({"id": 7}))), Some(7));
        assert_eq!(record_id(&rec(json!({"id": "12"}))), Some(12));
        assert_eq!(record_id(&rec(json!({"id": "x"}))), None);
        assert_eq!(record_id(&rec(json!({"id": -1}))), None);
        assert_eq!(record_id(&rec(json!({"name": "a"}))), None);
    }

    #[test]
    fn encoded_lines_are_single_lines() {
        let line = encode_line(&rec(json!({"id": 1, "text": "a\nb"}))).unwrap();
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn field_order_is_preserved() {
        let record = parse_record(br#"{"z":1,"a":2,"id":3}"#).unwrap();
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "id"]);
    }

    #[test]
    fn searchable_text_renders_nested_values_as_json() {
        assert_eq!(searchable_text(&json!("Plain")), "Plain");
        assert_eq!(searchable_text(&json!(42)), "42");
        assert_eq!(searchable_text(&json!({"k": "v"})), r#"{"k":"v"}"#);
        assert_eq!(searchable_text(&json!(null)), "null");
    }
}
