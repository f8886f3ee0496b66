//! Input normalization and schema validation with type coercion.
//!
//! Providers are sloppy about empty input: `""`, `null`, and a missing body
//! all normalize to `{}`. Validation walks the tool's schema object,
//! enforcing `required`, coercing scalar types (string, number, integer,
//! boolean), and checking `enum` membership. Unknown properties pass through
//! untouched.

use serde_json::{Map, Value};

use super::error::ToolError;

/// Normalizes a raw tool input to an object.
///
/// `""`, `null`, and missing input become `{}`; a JSON-encoded object string
/// is parsed; anything else is returned as-is for validation to reject.
pub fn normalize_input(input: Value) -> Value {
    match input {
        Value::Null => Value::Object(Map::new()),
        Value::String(s) if s.trim().is_empty() => Value::Object(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(obj)) => Value::Object(obj),
            _ => Value::String(s),
        },
        other => other,
    }
}

/// Validates a normalized input against a schema object, coercing field
/// types where the provider sent a compatible scalar.
pub fn validate_input(schema: &Value, input: Value) -> Result<Value, ToolError> {
    let mut obj = match input {
        Value::Object(obj) => obj,
        other => {
            return Err(ToolError::validation(
                "",
                format!("tool input must be an object, got {}", type_name(&other)),
            ))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match obj.get(field) {
                None | Some(Value::Null) => return Err(ToolError::missing_required(field)),
                _ => {}
            }
        }
    }

    for (field, field_schema) in &properties {
        let Some(value) = obj.remove(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let coerced = coerce_field(field, field_schema, value)?;
        if let Some(allowed) = field_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(&coerced) {
                return Err(ToolError::validation(
                    field,
                    format!(
                        "invalid value for {}: expected one of {}",
                        field,
                        allowed
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                ));
            }
        }
        obj.insert(field.clone(), coerced);
    }

    Ok(Value::Object(obj))
}

fn coerce_field(field: &str, field_schema: &Value, value: Value) -> Result<Value, ToolError> {
    let Some(expected) = field_schema.get("type").and_then(Value::as_str) else {
        return Ok(value);
    };

    let coerced = match (expected, &value) {
        ("string", Value::String(_)) => Some(value.clone()),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("number", Value::Number(_)) => Some(value.clone()),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ("integer", Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Value::Number(serde_json::Number::from(f as i64)))
            }
        }
        ("integer", Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .ok()
            .map(|i| Value::Number(serde_json::Number::from(i))),
        ("boolean", Value::Bool(_)) => Some(value.clone()),
        ("boolean", Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("array", Value::Array(_)) => Some(value.clone()),
        ("array", Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(arr)) => Some(Value::Array(arr)),
            _ => None,
        },
        ("object", Value::Object(_)) => Some(value.clone()),
        ("object", Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(obj)) => Some(Value::Object(obj)),
            _ => None,
        },
        _ => None,
    };

    coerced.ok_or_else(|| {
        ToolError::validation(
            field,
            format!(
                "invalid type for {}: expected {}, got {}",
                field,
                expected,
                type_name(&value)
            ),
        )
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "head_limit": { "type": "integer" },
                "case_insensitive": { "type": "boolean" },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"]
                }
            },
            "required": ["pattern"]
        })
    }

    #[test]
    fn normalize_maps_empty_shapes_to_empty_object() {
        assert_eq!(normalize_input(Value::Null), json!({}));
        assert_eq!(normalize_input(json!("")), json!({}));
        assert_eq!(normalize_input(json!("   ")), json!({}));
        assert_eq!(normalize_input(json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn normalize_parses_json_encoded_object_strings() {
        assert_eq!(
            normalize_input(json!("{\"pattern\":\"x\"}")),
            json!({ "pattern": "x" })
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = validate_input(&schema(), json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: pattern");
    }

    #[test]
    fn explicit_null_counts_as_missing_for_required() {
        let err = validate_input(&schema(), json!({ "pattern": null })).unwrap_err();
        assert!(matches!(err, ToolError::Validation { field, .. } if field == "pattern"));
    }

    #[test]
    fn scalar_coercion_from_strings() {
        let out = validate_input(
            &schema(),
            json!({ "pattern": "x", "head_limit": "25", "case_insensitive": "true" }),
        )
        .unwrap();
        assert_eq!(out["head_limit"], 25);
        assert_eq!(out["case_insensitive"], true);
    }

    #[test]
    fn number_is_coerced_to_string_when_schema_says_string() {
        let out = validate_input(&schema(), json!({ "pattern": 42 })).unwrap();
        assert_eq!(out["pattern"], "42");
    }

    #[test]
    fn enum_membership_is_checked_after_coercion() {
        let out =
            validate_input(&schema(), json!({ "pattern": "x", "output_mode": "count" })).unwrap();
        assert_eq!(out["output_mode"], "count");

        let err = validate_input(&schema(), json!({ "pattern": "x", "output_mode": "bogus" }))
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation { field, .. } if field == "output_mode"));
    }

    #[test]
    fn non_object_input_is_rejected_with_empty_field() {
        let err = validate_input(&schema(), json!([1, 2])).unwrap_err();
        assert!(matches!(err, ToolError::Validation { field, .. } if field.is_empty()));
    }

    #[test]
    fn unknown_properties_pass_through() {
        let out = validate_input(&schema(), json!({ "pattern": "x", "extra": 1 })).unwrap();
        assert_eq!(out["extra"], 1);
    }

    #[test]
    fn uncoercible_type_is_rejected() {
        let err = validate_input(&schema(), json!({ "pattern": ["a"] })).unwrap_err();
        assert!(err.to_string().contains("expected string"));
    }
}
