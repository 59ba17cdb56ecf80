//! Route schemas and the external validation contract.
//!
//! The validation engine itself is a collaborator: this crate only consumes
//! its [`SchemaCompiler`]/[`Checker`] contract. Schemas are declarative
//! JSON documents, either inline or references into the application's named
//! type registry; an unresolved reference is a registration-time error.

use crate::error::{Fault, RegistrationError};
use crate::route::Segment;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A declarative schema: inline, or a reference to a named type.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// An inline schema document.
    Inline(Value),
    /// A reference into the application's type registry.
    Ref(String),
}

impl Schema {
    /// Shorthand for an inline schema.
    #[must_use]
    pub const fn inline(value: Value) -> Self {
        Self::Inline(value)
    }

    /// Shorthand for a named reference.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }
}

/// The response slot: one schema, or one per status code.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseSchema {
    /// Applies to every status.
    Single(Schema),
    /// Applies per status code.
    PerStatus(BTreeMap<u16, Schema>),
}

/// Named schema slots attached to a route.
#[derive(Clone, Debug, Default)]
pub struct RouteSchema {
    /// Body schema.
    pub body: Option<Schema>,
    /// Header schema.
    pub headers: Option<Schema>,
    /// Query schema.
    pub query: Option<Schema>,
    /// Path-parameter schema. If absent, one is synthesized from path
    /// tokens at composition time.
    pub params: Option<Schema>,
    /// Cookie schema.
    pub cookie: Option<Schema>,
    /// Response schema.
    pub response: Option<ResponseSchema>,
}

impl RouteSchema {
    /// A schema with every slot absent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every slot is absent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.headers.is_none()
            && self.query.is_none()
            && self.params.is_none()
            && self.cookie.is_none()
            && self.response.is_none()
    }
}

/// A compiled checker, produced by the external validation engine.
pub trait Checker: Send + Sync {
    /// Whether the value satisfies the schema.
    fn check(&self, value: &Value) -> bool;

    /// Structured faults explaining why the value does not satisfy the
    /// schema. Empty when [`Checker::check`] holds.
    fn errors(&self, value: &Value) -> Vec<Fault>;
}

/// The validation-engine collaborator contract.
pub trait SchemaCompiler: Send + Sync {
    /// Compile a schema document into a checker.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::SchemaCompile`] when the document is
    /// not a schema this engine understands.
    fn compile(&self, schema: &Value) -> Result<Arc<dyn Checker>, RegistrationError>;
}

/// Synthesize a params schema from path tokens: every `:name` (and a
/// trailing `*`) becomes a required string property. Returns `None` for a
/// token-free path.
#[must_use]
pub fn synthesize_params(segments: &[Segment]) -> Option<Value> {
    let mut properties = Map::new();
    for segment in segments {
        match segment {
            Segment::Param(name) => {
                properties.insert(name.clone(), json!({"type": "string"}));
            }
            Segment::Wildcard => {
                properties.insert("*".to_string(), json!({"type": "string"}));
            }
            Segment::Static(_) => {}
        }
    }
    if properties.is_empty() {
        return None;
    }
    let required: Vec<Value> = properties
        .keys()
        .map(|name| Value::String(name.clone()))
        .collect();
    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}
