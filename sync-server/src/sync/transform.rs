//! Field Transforms
//!
//! Applies a mapping's field-level transform rules to one external record.
//! An empty rule set passes the record through unchanged.

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use shared::models::{FieldTransform, TransformKind};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Field '{field}': cannot coerce {found} to {wanted}")]
    Coercion {
        field: String,
        found: &'static str,
        wanted: &'static str,
    },
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

/// Look up a dot-separated path in the source record
fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = source;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn coerce(field: &str, kind: TransformKind, value: &Value) -> Result<Value, TransformError> {
    match kind {
        TransformKind::Copy => Ok(value.clone()),
        TransformKind::Lowercase => match value {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            other => Err(TransformError::Coercion {
                field: field.to_string(),
                found: type_name(other),
                wanted: "string",
            }),
        },
        TransformKind::Uppercase => match value {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Err(TransformError::Coercion {
                field: field.to_string(),
                found: type_name(other),
                wanted: "string",
            }),
        },
        TransformKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or(TransformError::Coercion {
                    field: field.to_string(),
                    found: "string",
                    wanted: "number",
                }),
            other => Err(TransformError::Coercion {
                field: field.to_string(),
                found: type_name(other),
                wanted: "number",
            }),
        },
        TransformKind::Decimal => {
            // Price columns want exact decimal strings, not floats
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(TransformError::Coercion {
                        field: field.to_string(),
                        found: type_name(other),
                        wanted: "decimal",
                    });
                }
            };
            let decimal: Decimal = text.trim().parse().map_err(|_| TransformError::Coercion {
                field: field.to_string(),
                found: "string",
                wanted: "decimal",
            })?;
            Ok(Value::String(decimal.normalize().to_string()))
        }
        TransformKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::Bool(n.as_i64() == Some(1))),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(TransformError::Coercion {
                    field: field.to_string(),
                    found: "string",
                    wanted: "boolean",
                }),
            },
            other => Err(TransformError::Coercion {
                field: field.to_string(),
                found: type_name(other),
                wanted: "boolean",
            }),
        },
    }
}

/// Apply a mapping's transform rules to one record's fields
///
/// With no rules the record passes through unchanged. A missing source path
/// produces a null target field (external records are sparse), while a
/// coercion failure is a per-record error for the run's bounded error list.
pub fn apply_transforms(
    rules: &[FieldTransform],
    source: &Value,
) -> Result<Value, TransformError> {
    if rules.is_empty() {
        return Ok(source.clone());
    }

    let mut target = Map::with_capacity(rules.len());
    for rule in rules {
        let value = match lookup(source, &rule.source) {
            None | Some(Value::Null) => Value::Null,
            Some(found) => coerce(&rule.source, rule.kind, found)?,
        };
        target.insert(rule.target.clone(), value);
    }
    Ok(Value::Object(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(source: &str, target: &str, kind: TransformKind) -> FieldTransform {
        FieldTransform {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        }
    }

    #[test]
    fn empty_rules_pass_record_through() {
        let source = json!({ "title": "Widget", "price": "9.90" });
        let out = apply_transforms(&[], &source).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn renames_and_coerces_fields() {
        let source = json!({
            "title": "Widget",
            "variant": { "price": "12.50" },
            "sku": "WDG-1",
            "active": "true"
        });
        let rules = vec![
            rule("title", "name", TransformKind::Copy),
            rule("variant.price", "wholesale_price", TransformKind::Decimal),
            rule("sku", "sku", TransformKind::Uppercase),
            rule("active", "is_active", TransformKind::Boolean),
        ];
        let out = apply_transforms(&rules, &source).unwrap();
        assert_eq!(out["name"], "Widget");
        assert_eq!(out["wholesale_price"], "12.5");
        assert_eq!(out["sku"], "WDG-1");
        assert_eq!(out["is_active"], true);
    }

    #[test]
    fn missing_source_path_yields_null() {
        let source = json!({ "title": "Widget" });
        let rules = vec![rule("vendor.name", "vendor", TransformKind::Copy)];
        let out = apply_transforms(&rules, &source).unwrap();
        assert_eq!(out["vendor"], Value::Null);
    }

    #[test]
    fn bad_decimal_is_a_coercion_error() {
        let source = json!({ "price": "not-a-price" });
        let rules = vec![rule("price", "price", TransformKind::Decimal)];
        assert!(apply_transforms(&rules, &source).is_err());
    }

    #[test]
    fn number_from_string_parses() {
        let source = json!({ "qty": "42" });
        let rules = vec![rule("qty", "quantity", TransformKind::Number)];
        let out = apply_transforms(&rules, &source).unwrap();
        assert_eq!(out["quantity"], json!(42.0));
    }
}
