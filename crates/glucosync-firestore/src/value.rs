//! Conversion between plain JSON and Firestore's typed REST values.
//!
//! Firestore wraps every field in a type tag: `{"integerValue": "42"}`,
//! `{"booleanValue": true}` and so on. 64-bit integers travel as strings.

use serde_json::{json, Map, Value};

/// Encodes a plain JSON value as a Firestore typed value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encodes a JSON object as a Firestore `fields` map.
#[must_use]
pub fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Reads an integer out of a typed value. Tolerates `doubleValue`, which
/// other writers may have used for the same field.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decode_integer(typed: &Value) -> Option<i64> {
    if let Some(raw) = typed.get("integerValue") {
        return match raw {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
    }
    typed
        .get("doubleValue")
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .map(|f| f.floor() as i64)
}

/// Reads the integer field `name` from a Firestore document.
#[must_use]
pub fn document_integer(document: &Value, name: &str) -> Option<i64> {
    document.get("fields")?.get(name).and_then(decode_integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_stored_record_shape() {
        let plain = json!({"timestamp": 1_705_276_800_000_i64, "value": 120, "isHi": false});
        let fields = encode_fields(plain.as_object().unwrap());
        assert_eq!(
            fields,
            json!({
                "timestamp": {"integerValue": "1705276800000"},
                "value": {"integerValue": "120"},
                "isHi": {"booleanValue": false}
            })
        );
    }

    #[test]
    fn encodes_nested_and_other_scalars() {
        assert_eq!(encode_value(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(encode_value(&json!("x")), json!({"stringValue": "x"}));
        assert_eq!(encode_value(&Value::Null), json!({"nullValue": null}));
        assert_eq!(
            encode_value(&json!([1])),
            json!({"arrayValue": {"values": [{"integerValue": "1"}]}})
        );
        assert_eq!(
            encode_value(&json!({"a": true})),
            json!({"mapValue": {"fields": {"a": {"booleanValue": true}}}})
        );
    }

    #[test]
    fn decodes_integer_variants() {
        assert_eq!(decode_integer(&json!({"integerValue": "42"})), Some(42));
        assert_eq!(decode_integer(&json!({"integerValue": 42})), Some(42));
        assert_eq!(decode_integer(&json!({"doubleValue": 42.9})), Some(42));
        assert_eq!(decode_integer(&json!({"stringValue": "42"})), None);
    }

    #[test]
    fn reads_document_field() {
        let doc = json!({
            "name": "projects/demo/databases/(default)/documents/glucose/abc",
            "fields": {"timestamp": {"integerValue": "60000"}}
        });
        assert_eq!(document_integer(&doc, "timestamp"), Some(60_000));
        assert_eq!(document_integer(&doc, "value"), None);
    }
}
