//! Schema validation helpers.
//!
//! This module validates a `serde_json::Value` against a [`Schema`] and
//! reports problems as diagnostics carrying the attribute path.
//!
//! # Example
//!
//! ```
//! use hashicups_provider::schema::{Attribute, Block, Schema};
//! use hashicups_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute(
//!     "items",
//!     Attribute::required_list_nested(
//!         Block::new()
//!             .with_attribute("name", Attribute::required_string())
//!             .with_attribute("price", Attribute::required_float64()),
//!     ),
//! );
//!
//! let diagnostics = validate(&schema, &json!({"items": [{"name": "Latte", "price": 3.5}]}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"items": [{"name": "Latte", "price": "cheap"}]}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("items.0.price".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Check a configuration value against a block schema.
///
/// Every problem found becomes one error diagnostic carrying its attribute path.
///
/// Required attributes must be present and non-null. Optional ones may be
/// missing or null, computed-only ones are skipped, and list-nested elements
/// are checked against their element block.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// [`validate`] as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether `value` passes [`validate`] without errors.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null if path.is_empty() => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value)))
                    .with_attribute_if_not_empty(path),
            );
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => match &attr.nested {
            Some(element) => validate_nested_list(element, v, path, diagnostics),
            None => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
        },
    }
}

fn validate_nested_list(
    element: &Block,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value.as_array() {
        Some(arr) => {
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(element, item, &item_path, diagnostics);
            }
        },
        None => diagnostics.push(type_error(path, "list", value)),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        // Only produced by list-nested attributes, which are checked
        // against their element block.
        AttributeType::List(_) | AttributeType::Object(_) => {},
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}

trait DiagnosticExt {
    fn with_attribute_if_not_empty(self, path: &str) -> Self;
}

impl DiagnosticExt for Diagnostic {
    fn with_attribute_if_not_empty(self, path: &str) -> Self {
        if path.is_empty() {
            self
        } else {
            self.with_attribute(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PlanModifier;
    use serde_json::json;

    fn food_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "id",
                Attribute::computed_string().with_plan_modifier(PlanModifier::UseStateForUnknown),
            )
            .with_attribute("last_updated", Attribute::computed_string())
            .with_attribute(
                "items",
                Attribute::required_list_nested(
                    Block::new()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("price", Attribute::required_float64()),
                ),
            )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("host", Attribute::required_string());

        let diagnostics = validate(&schema, &json!({"host": "http://localhost:19090"}));
        assert!(diagnostics.is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("host".to_string()));

        let diagnostics = validate(&schema, &json!({"host": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"host": 8080}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = Schema::v0().with_attribute("username", Attribute::optional_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"username": null})).is_empty());
        assert_eq!(validate(&schema, &json!({"username": true})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let diagnostics = validate(
            &food_schema(),
            &json!({"id": 42, "last_updated": false, "items": []}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_empty_item_list() {
        assert!(is_valid(&food_schema(), &json!({"items": []})));
    }

    #[test]
    fn test_validate_missing_items() {
        let diagnostics = validate(&food_schema(), &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("items".to_string()));
    }

    #[test]
    fn test_validate_nested_item_fields() {
        let diagnostics = validate(
            &food_schema(),
            &json!({"items": [
                {"name": "Burger", "price": 9.99},
                {"price": 3.5},
                {"name": "Shake", "price": "four"}
            ]}),
        );

        assert_eq!(diagnostics.len(), 2);
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert!(paths.contains(&"items.1.name"));
        assert!(paths.contains(&"items.2.price"));
    }

    #[test]
    fn test_validate_nested_item_not_object() {
        let diagnostics = validate(&food_schema(), &json!({"items": ["Burger"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert_eq!(diagnostics[0].attribute, Some("items.0".to_string()));
    }

    #[test]
    fn test_validate_items_not_list() {
        let diagnostics = validate(&food_schema(), &json!({"items": {"name": "Burger"}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail,
            Some("Expected list, got object".to_string())
        );
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&food_schema(), &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result_helper() {
        assert!(validate_result(&food_schema(), &json!({"items": []})).is_ok());
        let err = validate_result(&food_schema(), &json!({})).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
