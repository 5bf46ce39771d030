//! Decoding property maps into typed resource structures
//!
//! Provider stubs receive untyped [`PropertyMap`]s and hand typed structures to
//! resource implementations. Decoding validates every schema field before
//! deserializing and reports all failures at once.

use crate::property::{CheckFailure, PropertyKey, PropertyMap};
use crate::schema::ResourceSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A problem with one field of a property map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: PropertyKey,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<PropertyKey>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, "missing required field")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.reason)
        } else {
            write!(f, "{}: {}", self.field, self.reason)
        }
    }
}

impl From<FieldError> for CheckFailure {
    fn from(err: FieldError) -> Self {
        CheckFailure::new(err.field, err.reason)
    }
}

/// Every field that failed to decode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) failed to decode: {}", .failures.len(), join_failures(.failures))]
pub struct DecodeError {
    pub failures: Vec<FieldError>,
}

impl DecodeError {
    pub fn new(failures: Vec<FieldError>) -> Self {
        Self { failures }
    }
}

fn join_failures(failures: &[FieldError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks a property map against a schema without deserializing it
///
/// Unknown values count as present, and keys the schema does not mention are
/// ignored.
pub fn validate(schema: &ResourceSchema, props: &PropertyMap) -> Vec<FieldError> {
    let mut failures = Vec::new();

    for field in &schema.fields {
        match props.get(&field.name) {
            None => {
                if field.required {
                    failures.push(FieldError::missing(&field.name));
                }
            }
            Some(value) if value.is_null() => {
                if field.required {
                    failures.push(FieldError::missing(&field.name));
                }
            }
            Some(value) => {
                if !field.kind.accepts(value) {
                    failures.push(FieldError::new(
                        &field.name,
                        format!(
                            "expected {}, got {}",
                            field.kind.name(),
                            value.type_name()
                        ),
                    ));
                }
            }
        }
    }

    failures
}

/// Validates `props` against `schema` and deserializes it into `T`
pub fn decode<T: DeserializeOwned>(
    schema: &ResourceSchema,
    props: &PropertyMap,
) -> Result<T, DecodeError> {
    let failures = validate(schema, props);
    if !failures.is_empty() {
        return Err(DecodeError::new(failures));
    }

    serde_json::from_value(props.to_json()).map_err(|e| {
        tracing::debug!(ty = %schema.token, error = %e, "typed decode failed after validation");
        DecodeError::new(vec![FieldError::new("", e.to_string())])
    })
}

/// Serializes a typed structure back into a property map
pub fn encode<T: Serialize>(value: &T) -> Result<PropertyMap, DecodeError> {
    let json = serde_json::to_value(value)
        .map_err(|e| DecodeError::new(vec![FieldError::new("", e.to_string())]))?;
    PropertyMap::from_json(json).ok_or_else(|| {
        DecodeError::new(vec![FieldError::new(
            "",
            "resource did not serialize to an object",
        )])
    })
}
