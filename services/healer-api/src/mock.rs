//! Synthetic degradation payloads
//!
//! When an upstream is down, callers can ask for a stand-in response shaped
//! like the real one. The builder starts from whatever real material the
//! caller still has (cached payload, example response), then fills the gaps
//! named by the schema hint with obviously-fake placeholder values.

use rand::RngExt;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Material the caller provides for mock synthesis.
#[derive(Debug, Default, Deserialize)]
pub struct MockRequest {
    #[serde(default)]
    pub schema_hint: Option<Map<String, Value>>,
    #[serde(default)]
    pub example_response: Option<Value>,
    #[serde(default)]
    pub cached_payload: Option<Value>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Build a mock response body from the provided material.
///
/// Preference order for the base object: cached payload, then example
/// response (first element when it's a list). Fields named by the schema
/// hint (including its `fieldMap`) that are still missing get placeholder
/// strings. A completely empty result falls back to a single marker field.
pub fn generate_mock_payload(request: &MockRequest) -> Value {
    let mut base = Map::new();

    if let Some(Value::Object(cached)) = &request.cached_payload {
        base.extend(cached.clone());
    } else if let Some(Value::Object(example)) = &request.example_response {
        base.extend(example.clone());
    } else if let Some(Value::Array(items)) = &request.example_response
        && let Some(Value::Object(first)) = items.first()
    {
        base.extend(first.clone());
    }

    let mut fields: Vec<String> = Vec::new();
    if let Some(schema) = &request.schema_hint {
        fields.extend(schema.keys().cloned());
        if let Some(Value::Object(field_map)) = schema.get("fieldMap") {
            fields.extend(field_map.keys().cloned());
        }
    }

    let mut rng = rand::rng();
    for field in fields {
        if !base.contains_key(&field) {
            let marker = format!(
                "MOCK_{}_{}",
                field.to_uppercase(),
                rng.random_range(100..1000)
            );
            base.insert(field, Value::String(marker));
        }
    }

    if base.is_empty() {
        base.insert(
            "mock".into(),
            Value::String(format!("MOCK_VALUE_{}", rng.random_range(1000..10000))),
        );
    }

    Value::Object(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> MockRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn cached_payload_wins_over_example() {
        let req = request(json!({
            "cached_payload": {"name": "cached"},
            "example_response": {"name": "example"},
        }));
        let mock = generate_mock_payload(&req);
        assert_eq!(mock["name"], "cached");
    }

    #[test]
    fn example_list_uses_first_object() {
        let req = request(json!({
            "example_response": [{"id": 1}, {"id": 2}],
        }));
        let mock = generate_mock_payload(&req);
        assert_eq!(mock["id"], 1);
    }

    #[test]
    fn schema_hint_fills_missing_fields() {
        let req = request(json!({
            "cached_payload": {"present": true},
            "schema_hint": {"present": "bool", "missing": "string"},
        }));
        let mock = generate_mock_payload(&req);
        assert_eq!(mock["present"], true, "existing fields are not overwritten");
        let filled = mock["missing"].as_str().unwrap();
        assert!(filled.starts_with("MOCK_MISSING_"), "got: {filled}");
    }

    #[test]
    fn field_map_keys_are_included() {
        let req = request(json!({
            "schema_hint": {"fieldMap": {"nested_field": "x"}},
        }));
        let mock = generate_mock_payload(&req);
        assert!(mock.get("nested_field").is_some());
    }

    #[test]
    fn empty_material_yields_marker() {
        let mock = generate_mock_payload(&MockRequest::default());
        let marker = mock["mock"].as_str().unwrap();
        assert!(marker.starts_with("MOCK_VALUE_"), "got: {marker}");
    }
}
