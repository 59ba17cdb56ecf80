//! A structural stub for the schema-validation collaborator.
//!
//! The real validation engine is external; tests need something that
//! honors the `compile`/`check`/`errors` contract with predictable
//! behavior. The stub understands a small structural subset: `type`,
//! `properties`, `required`, `items`, `enum`, and `format: "numeric"`
//! (a string that parses as a number).

use serde_json::Value;
use std::sync::Arc;
use weave_core::error::{Fault, RegistrationError};
use weave_core::schema::{Checker, SchemaCompiler};

/// Stub schema compiler for tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubCompiler;

impl StubCompiler {
    /// Create a stub compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SchemaCompiler for StubCompiler {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn Checker>, RegistrationError> {
        if !schema.is_object() {
            return Err(RegistrationError::SchemaCompile {
                slot: "schema".to_string(),
                message: "stub compiler expects an object schema".to_string(),
            });
        }
        Ok(Arc::new(StructuralChecker {
            schema: schema.clone(),
        }))
    }
}

/// Checker over the structural subset.
pub struct StructuralChecker {
    schema: Value,
}

impl Checker for StructuralChecker {
    fn check(&self, value: &Value) -> bool {
        self.errors(value).is_empty()
    }

    fn errors(&self, value: &Value) -> Vec<Fault> {
        let mut faults = Vec::new();
        walk(&self.schema, value, "", &mut faults);
        faults
    }
}

fn walk(schema: &Value, value: &Value, path: &str, faults: &mut Vec<Fault>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            faults.push(Fault::new(path, format!("expected {expected}")));
            return;
        }
    }

    if let Some("numeric") = schema.get("format").and_then(Value::as_str) {
        if let Some(text) = value.as_str() {
            if text.is_empty() || text.parse::<f64>().is_err() {
                faults.push(Fault::new(path, "expected a numeric string"));
            }
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            faults.push(Fault::new(path, "not one of the allowed values"));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, sub) in properties {
                if let Some(nested) = object.get(name) {
                    walk(sub, nested, &join(path, name), faults);
                }
            }
        }
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    faults.push(Fault::new(join(path, name), "missing required property"));
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, element) in array.iter().enumerate() {
            walk(items, element, &join(path, &index.to_string()), faults);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type names are permissive; the stub is not a validator
        // conformance suite.
        _ => true,
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
