//! Resource schema descriptors
//!
//! A [`ResourceSchema`] describes one resource kind: its type token, the
//! fields it accepts, and which of those fields cannot be changed in place.
//! Provider stubs use it to decode requests and the change planner uses it to
//! find static replacement triggers. Schemas are registered by type token in a
//! [`SchemaRegistry`].

use crate::error::{LumiplugError, Result};
use crate::property::{PropertyKey, PropertyValue};
use crate::tokens::Type;
use std::collections::HashMap;
use std::sync::Arc;

/// Property that holds a resource's logical name unless a schema says otherwise
pub const DEFAULT_NAME_PROPERTY: &str = "name";

/// Kind of value a field accepts
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Any,
    String,
    Number,
    Bool,
    /// Identifier of another resource; references are accepted too
    Id,
    Array(Box<FieldKind>),
    Object,
}

impl FieldKind {
    pub fn array_of(kind: FieldKind) -> Self {
        FieldKind::Array(Box::new(kind))
    }

    /// Whether a value is acceptable for this kind
    ///
    /// Nulls are handled by the required/optional check, and unknowns are
    /// acceptable anywhere since they only become concrete later.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (_, PropertyValue::Null) | (_, PropertyValue::Unknown) => true,
            (FieldKind::Any, _) => true,
            (FieldKind::String, PropertyValue::String(_)) => true,
            (FieldKind::Number, PropertyValue::Number(_)) => true,
            (FieldKind::Bool, PropertyValue::Bool(_)) => true,
            (FieldKind::Id, PropertyValue::String(_)) => true,
            (FieldKind::Id, PropertyValue::Resource(_)) => true,
            (FieldKind::Array(element), PropertyValue::Array(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (FieldKind::Object, PropertyValue::Object(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> String {
        match self {
            FieldKind::Any => "any".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::Id => "resource id".to_string(),
            FieldKind::Array(element) => format!("array of {}", element.name()),
            FieldKind::Object => "object".to_string(),
        }
    }
}

/// One field of a resource schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: PropertyKey,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSchema {
    pub fn required(name: impl Into<PropertyKey>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<PropertyKey>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Descriptor for one resource kind
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub token: Type,
    pub fields: Vec<FieldSchema>,
    /// Fields whose change forces destroy-and-recreate, in declaration order
    pub replaces: Vec<PropertyKey>,
    pub name_property: PropertyKey,
}

impl ResourceSchema {
    pub fn builder(token: Type) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder::new(token)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_replace_trigger(&self, key: &str) -> bool {
        self.replaces.iter().any(|k| k == key)
    }
}

/// Fluent builder for [`ResourceSchema`]
pub struct ResourceSchemaBuilder {
    token: Type,
    fields: Vec<FieldSchema>,
    replaces: Vec<PropertyKey>,
    name_property: PropertyKey,
}

impl ResourceSchemaBuilder {
    pub fn new(token: Type) -> Self {
        Self {
            token,
            fields: Vec::new(),
            replaces: Vec::new(),
            name_property: DEFAULT_NAME_PROPERTY.to_string(),
        }
    }

    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema::required(name, kind));
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema::optional(name, kind));
        self
    }

    /// Required field that also forces replacement when it changes
    pub fn required_replace(self, name: &str, kind: FieldKind) -> Self {
        self.required(name, kind).replaces(name)
    }

    /// Optional field that also forces replacement when it changes
    pub fn optional_replace(self, name: &str, kind: FieldKind) -> Self {
        self.optional(name, kind).replaces(name)
    }

    pub fn replaces(mut self, name: &str) -> Self {
        if !self.replaces.iter().any(|k| k == name) {
            self.replaces.push(name.to_string());
        }
        self
    }

    pub fn name_property(mut self, name: &str) -> Self {
        self.name_property = name.to_string();
        self
    }

    pub fn build(self) -> ResourceSchema {
        ResourceSchema {
            token: self.token,
            fields: self.fields,
            replaces: self.replaces,
            name_property: self.name_property,
        }
    }
}

/// Schemas keyed by type token
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<Type, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema; registering the same token twice is an error
    pub fn register(&mut self, schema: ResourceSchema) -> Result<()> {
        if self.schemas.contains_key(&schema.token) {
            return Err(LumiplugError::Schema(format!(
                "type '{}' is already registered",
                schema.token
            )));
        }
        self.schemas.insert(schema.token.clone(), Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, ty: &Type) -> Option<Arc<ResourceSchema>> {
        self.schemas.get(ty).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.schemas.keys()
    }
}
