//! Practical JSON-Schema validation subset for tool boundaries.
//!
//! Supported checks: `required`, `type` (string, number, integer, boolean,
//! array, object, null), `enum`, `minimum`/`maximum`, `minLength`/
//! `maxLength`, `minItems`/`maxItems`, and recursion into nested objects
//! whose schema declares `properties`. `pattern` and `$ref` are not
//! supported. Errors are aggregated into an ordered `{field, message}` list;
//! a failed type check suppresses further constraint checks on that value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path, e.g. `pin` or `config.mode`.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Failures in evaluation order; empty means valid.
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// True when no errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn absorb(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    /// Render all errors as one line for JSON-RPC error messages.
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return "OK".to_string();
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| {
                if e.field.is_empty() {
                    e.message.clone()
                } else {
                    format!("'{}' {}", e.field, e.message)
                }
            })
            .collect();
        format!("Invalid arguments: {}", parts.join("; "))
    }
}

/// Human-readable type name of a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
    }
}

/// Check a value against a schema `type` string. Unknown types pass.
fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Format a schema number without a trailing `.0` for whole values.
fn fmt_number(v: &Value) -> String {
    if let Some(i) = v.as_i64() {
        i.to_string()
    } else if let Some(f) = v.as_f64() {
        f.to_string()
    } else {
        v.to_string()
    }
}

fn fmt_enum_member(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{s}\""),
        Value::Bool(b) => b.to_string(),
        Value::Number(_) => fmt_number(v),
        _ => "?".to_string(),
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Apply the shared constraint set (enum, ranges, lengths) to one value.
/// Assumes any `type` check has already passed.
fn check_constraints(result: &mut ValidationResult, path: &str, value: &Value, schema: &Value) {
    if let Some(enum_values) = schema.get("enum").and_then(Value::as_array) {
        let found = enum_values.iter().any(|ev| ev == value);
        if !found {
            let members: Vec<String> = enum_values.iter().map(fmt_enum_member).collect();
            result.add(path, format!("must be one of [{}]", members.join(", ")));
        }
    }

    if value.is_number() {
        if let Some(min) = schema.get("minimum") {
            if let (Some(v), Some(m)) = (value.as_f64(), min.as_f64()) {
                if v < m {
                    result.add(path, format!("must be >= {}", fmt_number(min)));
                }
            }
        }
        if let Some(max) = schema.get("maximum") {
            if let (Some(v), Some(m)) = (value.as_f64(), max.as_f64()) {
                if v > m {
                    result.add(path, format!("must be <= {}", fmt_number(max)));
                }
            }
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if (len as u64) < min {
                result.add(path, format!("length must be >= {min}"));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if (len as u64) > max {
                result.add(path, format!("length must be <= {max}"));
            }
        }
    }

    if let Some(items) = value.as_array() {
        let len = items.len() as u64;
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if len < min {
                result.add(path, format!("must have >= {min} items"));
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
            if len > max {
                result.add(path, format!("must have <= {max} items"));
            }
        }
    }
}

fn validate_object(args: &Value, schema: &Value, prefix: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for req in required {
            let Some(field) = req.as_str() else { continue };
            let path = join_path(prefix, field);
            match args.get(field) {
                None | Some(Value::Null) => result.add(path, "is required"),
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, prop_schema) in properties {
            let Some(value) = args.get(field) else { continue };
            if value.is_null() {
                continue;
            }
            let path = join_path(prefix, field);

            if let Some(expected) = prop_schema.get("type").and_then(Value::as_str) {
                if !type_matches(value, expected) {
                    result.add(
                        path,
                        format!("must be {expected}, got {}", json_type_name(value)),
                    );
                    continue;
                }
            }

            check_constraints(&mut result, &path, value, prop_schema);

            if value.is_object() && prop_schema.get("properties").is_some() {
                result.absorb(validate_object(value, prop_schema, &path));
            }
        }
    }

    result
}

/// Validate a tools/call argument object against the tool's input schema
/// (whose top-level `type` is `object`).
pub fn validate_arguments(args: &Value, schema: &Value) -> ValidationResult {
    validate_object(args, schema, "")
}

/// Validate an arbitrary root value against a schema. Used for tool output,
/// where the root is not necessarily an object.
pub fn validate_value(value: &Value, schema: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let root = "(root)";

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            result.add(
                root,
                format!("must be {expected}, got {}", json_type_name(value)),
            );
            return result;
        }
        if expected == "object" && value.is_object() {
            return validate_object(value, schema, "");
        }
    }

    check_constraints(&mut result, root, value, schema);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_field_missing() {
        let schema = json!({"type":"object","properties":{"pin":{"type":"integer"}},"required":["pin"]});
        let result = validate_arguments(&json!({}), &schema);
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].field, "pin");
        assert_eq!(result.errors[0].message, "is required");
    }

    #[test]
    fn required_field_null_counts_as_missing() {
        let schema = json!({"type":"object","required":["pin"]});
        let result = validate_arguments(&json!({"pin": null}), &schema);
        assert_eq!(result.errors[0].message, "is required");
    }

    #[test]
    fn wrong_type_message() {
        let schema = json!({
            "type": "object",
            "properties": {"pin": {"type": "integer", "minimum": 0, "maximum": 39}},
            "required": ["pin"]
        });
        let result = validate_arguments(&json!({"pin": "x"}), &schema);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "pin");
        assert_eq!(result.errors[0].message, "must be integer, got string");
    }

    #[test]
    fn type_failure_suppresses_range_checks() {
        let schema = json!({"type":"object","properties":{"pin":{"type":"integer","minimum":10}}});
        let result = validate_arguments(&json!({"pin": "x"}), &schema);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn numeric_range() {
        let schema = json!({"type":"object","properties":{"pin":{"type":"integer","minimum":0,"maximum":39}}});
        let ok = validate_arguments(&json!({"pin": 13}), &schema);
        assert!(ok.is_valid());
        let low = validate_arguments(&json!({"pin": -1}), &schema);
        assert_eq!(low.errors[0].message, "must be >= 0");
        let high = validate_arguments(&json!({"pin": 40}), &schema);
        assert_eq!(high.errors[0].message, "must be <= 39");
    }

    #[test]
    fn float_rejected_for_integer() {
        let schema = json!({"type":"object","properties":{"pin":{"type":"integer"}}});
        let result = validate_arguments(&json!({"pin": 1.5}), &schema);
        assert_eq!(result.errors[0].message, "must be integer, got number");
    }

    #[test]
    fn enum_membership() {
        let schema = json!({"type":"object","properties":{"mode":{"type":"string","enum":["in","out"]}}});
        assert!(validate_arguments(&json!({"mode": "in"}), &schema).is_valid());
        let bad = validate_arguments(&json!({"mode": "sideways"}), &schema);
        assert_eq!(bad.errors[0].message, "must be one of [\"in\", \"out\"]");
    }

    #[test]
    fn string_length_bounds() {
        let schema = json!({"type":"object","properties":{"name":{"type":"string","minLength":2,"maxLength":4}}});
        assert!(validate_arguments(&json!({"name": "abc"}), &schema).is_valid());
        let short = validate_arguments(&json!({"name": "a"}), &schema);
        assert_eq!(short.errors[0].message, "length must be >= 2");
        let long = validate_arguments(&json!({"name": "abcde"}), &schema);
        assert_eq!(long.errors[0].message, "length must be <= 4");
    }

    #[test]
    fn array_item_bounds() {
        let schema = json!({"type":"object","properties":{"pins":{"type":"array","minItems":1,"maxItems":3}}});
        let empty = validate_arguments(&json!({"pins": []}), &schema);
        assert_eq!(empty.errors[0].message, "must have >= 1 items");
        let many = validate_arguments(&json!({"pins": [1, 2, 3, 4]}), &schema);
        assert_eq!(many.errors[0].message, "must have <= 3 items");
    }

    #[test]
    fn nested_object_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "config": {
                    "type": "object",
                    "properties": {"mode": {"type": "string"}},
                    "required": ["mode"]
                }
            }
        });
        let result = validate_arguments(&json!({"config": {}}), &schema);
        assert_eq!(result.errors[0].field, "config.mode");
        assert_eq!(result.errors[0].message, "is required");
    }

    #[test]
    fn errors_aggregate_without_short_circuit() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "string"}
            },
            "required": ["a", "b", "c"]
        });
        let result = validate_arguments(&json!({"a": "x", "b": 1}), &schema);
        // "c" missing plus two type errors.
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn root_value_validation() {
        let schema = json!({"type": "number", "minimum": 0});
        assert!(validate_value(&json!(23.5), &schema).is_valid());
        let bad = validate_value(&json!("23.5"), &schema);
        assert_eq!(bad.errors[0].field, "(root)");
        assert_eq!(bad.errors[0].message, "must be number, got string");
    }

    #[test]
    fn root_object_delegates_to_arguments() {
        let schema = json!({"type":"object","properties":{"v":{"type":"number"}},"required":["v"]});
        let result = validate_value(&json!({"v": "x"}), &schema);
        assert_eq!(result.errors[0].field, "v");
    }

    #[test]
    fn unknown_type_passes() {
        let schema = json!({"type":"object","properties":{"x":{"type":"date-time"}}});
        assert!(validate_arguments(&json!({"x": "2025-01-01"}), &schema).is_valid());
    }

    #[test]
    fn summary_formatting() {
        let schema = json!({"type":"object","required":["pin"]});
        let result = validate_arguments(&json!({}), &schema);
        assert_eq!(result.summary(), "Invalid arguments: 'pin' is required");
    }
}
