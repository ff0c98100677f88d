//! Conversion between plain JSON and Firestore's typed value encoding.
//!
//! Firestore REST wraps every value in a single-key object naming its type,
//! e.g. `{"integerValue": "3"}` or `{"mapValue": {"fields": {...}}}`.

use serde_json::{Map, Number, Value, json};

use crate::error::BackendError;

/// Encode a JSON object as a Firestore `fields` map.
///
/// # Errors
///
/// Returns `BackendError::Malformed` if `data` is not an object.
pub fn encode_fields(data: &Value) -> Result<Value, BackendError> {
    let object = data.as_object().ok_or_else(|| BackendError::Malformed {
        path: "fields".to_string(),
        reason: "document data must be an object".to_string(),
    })?;
    Ok(Value::Object(encode_map(object)))
}

fn encode_map(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Encode one JSON value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => n.as_i64().map_or_else(
            || json!({ "doubleValue": n.as_f64() }),
            |i| json!({ "integerValue": i.to_string() }),
        ),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(object) => json!({ "mapValue": { "fields": encode_map(object) } }),
    }
}

/// Decode a Firestore `fields` map into a JSON object. A missing map decodes
/// to an empty object.
///
/// # Errors
///
/// Returns `BackendError::Malformed` on an unrecognized value encoding.
pub fn decode_fields(fields: Option<&Value>) -> Result<Value, BackendError> {
    let Some(fields) = fields else {
        return Ok(Value::Object(Map::new()));
    };
    let object = fields.as_object().ok_or_else(|| malformed("fields is not a map"))?;

    object
        .iter()
        .map(|(k, v)| decode_value(v).map(|v| (k.clone(), v)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object)
}

/// Decode one Firestore value.
///
/// Timestamps, references and bytes decode to their string form.
///
/// # Errors
///
/// Returns `BackendError::Malformed` on an unrecognized value encoding.
pub fn decode_value(value: &Value) -> Result<Value, BackendError> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed("value is not an object"))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| malformed("value has no type"))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| malformed("booleanValue is not a bool")),
        "integerValue" => {
            // Sent as a string to survive 64-bit precision loss in JSON.
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| malformed("integerValue is not an integer"))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            let parsed = parsed.ok_or_else(|| malformed("doubleValue is not a number"))?;
            Ok(Number::from_f64(parsed).map_or(Value::Null, Value::Number))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| malformed("expected a string")),
        "geoPointValue" => Ok(inner.clone()),
        "mapValue" => decode_fields(inner.get("fields")),
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map_or_else(|| Ok(Vec::new()), |values| {
                values.iter().map(decode_value).collect()
            })
            .map(Value::Array),
        other => Err(malformed(&format!("unknown value type {other}"))),
    }
}

fn malformed(reason: &str) -> BackendError {
    BackendError::Malformed {
        path: "fields".to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode_value(&json!(3)), json!({"integerValue": "3"}));
        assert_eq!(encode_value(&json!(2.5)), json!({"doubleValue": 2.5}));
        assert_eq!(encode_value(&json!("05")), json!({"stringValue": "05"}));
        assert_eq!(encode_value(&json!(true)), json!({"booleanValue": true}));
        assert_eq!(encode_value(&Value::Null), json!({"nullValue": null}));
    }

    #[test]
    fn test_encode_nested() {
        let encoded = encode_fields(&json!({"items": [{"qty": 2}]})).unwrap();
        assert_eq!(
            encoded,
            json!({
                "items": {"arrayValue": {"values": [
                    {"mapValue": {"fields": {"qty": {"integerValue": "2"}}}}
                ]}}
            })
        );
    }

    #[test]
    fn test_encode_rejects_non_object() {
        assert!(encode_fields(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_decode_server_document() {
        let fields = json!({
            "code": {"stringValue": "SAVE10"},
            "discount": {"integerValue": "10"},
            "rate": {"doubleValue": 0.5},
            "active": {"booleanValue": true},
            "valid_until": {"timestampValue": "2026-01-01T00:00:00Z"},
            "tags": {"arrayValue": {}},
            "meta": {"mapValue": {}}
        });

        let decoded = decode_fields(Some(&fields)).unwrap();
        assert_eq!(
            decoded,
            json!({
                "code": "SAVE10",
                "discount": 10,
                "rate": 0.5,
                "active": true,
                "valid_until": "2026-01-01T00:00:00Z",
                "tags": [],
                "meta": {}
            })
        );
    }

    #[test]
    fn test_decode_missing_fields_is_empty_object() {
        assert_eq!(decode_fields(None).unwrap(), json!({}));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode_value(&json!({"vectorValue": {}})).unwrap_err();
        assert!(matches!(err, BackendError::Malformed { .. }));
    }

    #[test]
    fn test_encode_then_decode_preserves_order_document() {
        let order = json!({
            "restaurant_id": "rest123",
            "table_no": "05",
            "items": [{"item": "dosa", "quantity": 2, "price": "120.00"}],
            "coupon_code": null
        });
        let encoded = encode_fields(&order).unwrap();
        assert_eq!(decode_fields(Some(&encoded)).unwrap(), order);
    }
}
