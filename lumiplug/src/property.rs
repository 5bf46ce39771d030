//! Property value model
//!
//! This module provides the in-memory representation of a resource's desired
//! or actual state: a [`PropertyMap`] of keys to [`PropertyValue`]s. A value
//! that will exist but is not yet computed is represented explicitly by
//! [`PropertyValue::Unknown`], never by a magic marker.

use crate::tokens::Urn;
use std::collections::BTreeMap;
use std::fmt;

/// Key of a top-level or nested property
pub type PropertyKey = String;

/// Identifier assigned by a provider when a resource is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether the properties produced by a provider call can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// The call completed and the resulting properties are authoritative
    Ok,
    /// The call's outcome is indeterminate; the resource may or may not exist
    Unknown,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceState::Ok => f.write_str("ok"),
            ResourceState::Unknown => f.write_str("unknown"),
        }
    }
}

/// A validation finding reported by Check
///
/// Failures are data, not errors: an empty list means the candidate properties
/// are acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub property: PropertyKey,
    pub reason: String,
}

impl CheckFailure {
    pub fn new(property: impl Into<PropertyKey>, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.reason)
    }
}

/// A single property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(PropertyMap),
    /// Reference to another resource by its logical name
    Resource(Urn),
    /// Value that will exist but is not yet computed
    Unknown,
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PropertyValue::Unknown)
    }

    /// True if this value is unknown or holds an unknown anywhere inside it
    pub fn contains_unknowns(&self) -> bool {
        match self {
            PropertyValue::Unknown => true,
            PropertyValue::Array(items) => items.iter().any(PropertyValue::contains_unknowns),
            PropertyValue::Object(map) => map.contains_unknowns(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PropertyMap> {
        match self {
            PropertyValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Urn> {
        match self {
            PropertyValue::Resource(urn) => Some(urn),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Number(_) => "number",
            PropertyValue::String(_) => "string",
            PropertyValue::Array(_) => "array",
            PropertyValue::Object(_) => "object",
            PropertyValue::Resource(_) => "resource",
            PropertyValue::Unknown => "unknown",
        }
    }

    /// Plain JSON view of the value; unknowns have no JSON form and yield `None`
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value;

        match self {
            PropertyValue::Null => Some(Value::Null),
            PropertyValue::Bool(b) => Some(Value::Bool(*b)),
            PropertyValue::Number(n) => Some(number_to_json(*n)),
            PropertyValue::String(s) => Some(Value::String(s.clone())),
            PropertyValue::Array(items) => Some(Value::Array(
                items.iter().map(|v| v.to_json().unwrap_or(Value::Null)).collect(),
            )),
            PropertyValue::Object(map) => Some(map.to_json()),
            PropertyValue::Resource(urn) => Some(Value::String(urn.to_string())),
            PropertyValue::Unknown => None,
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Number)
                .unwrap_or(PropertyValue::Null),
            Value::String(s) => PropertyValue::String(s),
            Value::Array(items) => {
                PropertyValue::Array(items.into_iter().map(PropertyValue::from_json).collect())
            }
            Value::Object(fields) => PropertyValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, PropertyValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

// Integral numbers go out as JSON integers so typed integer fields accept them.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(items: Vec<PropertyValue>) -> Self {
        PropertyValue::Array(items)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(map: PropertyMap) -> Self {
        PropertyValue::Object(map)
    }
}

impl From<Urn> for PropertyValue {
    fn from(urn: Urn) -> Self {
        PropertyValue::Resource(urn)
    }
}

/// Mapping of property keys to values
///
/// Keys are kept sorted so iteration and diff output are stable; equality does
/// not depend on the order properties were inserted in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyMap {
    values: BTreeMap<PropertyKey, PropertyValue>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<PropertyKey>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.values.insert(key.into(), value.into())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<PropertyKey>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyValue)> {
        self.values.iter()
    }

    /// Copies every entry of `other` into this map, overwriting existing keys
    /// and leaving keys that `other` does not mention untouched
    pub fn merge(&mut self, other: PropertyMap) {
        self.values.extend(other.values);
    }

    pub fn contains_unknowns(&self) -> bool {
        self.values.values().any(PropertyValue::contains_unknowns)
    }

    /// Top-level keys whose values are, or contain, unknowns
    pub fn unknown_keys(&self) -> Vec<PropertyKey> {
        self.values
            .iter()
            .filter(|(_, v)| v.contains_unknowns())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Plain JSON object for typed deserialization; unknown entries are left out
    pub fn to_json(&self) -> serde_json::Value {
        let fields = self
            .values
            .iter()
            .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
            .collect();
        serde_json::Value::Object(fields)
    }

    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match PropertyValue::from_json(value) {
            PropertyValue::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl FromIterator<(PropertyKey, PropertyValue)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (PropertyKey, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PropertyMap {
    type Item = (PropertyKey, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<PropertyKey, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyMap {
    type Item = (&'a PropertyKey, &'a PropertyValue);
    type IntoIter = std::collections::btree_map::Iter<'a, PropertyKey, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn unknown_inside_aggregate_marks_aggregate_unknown() {
        let rule = PropertyMap::new()
            .with("ipProtocol", "tcp")
            .with("cidrIp", PropertyValue::Unknown);
        let props = PropertyMap::new()
            .with("name", "web")
            .with("securityGroupIngress", vec![PropertyValue::Object(rule)]);

        assert!(props.contains_unknowns());
        assert_eq!(props.unknown_keys(), vec!["securityGroupIngress".to_string()]);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = PropertyMap::new().with("a", 1.0).with("b", "x");
        let b = PropertyMap::new().with("b", "x").with("a", 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn merge_keeps_unreported_keys() {
        let mut props = PropertyMap::new().with("name", "web").with("local", true);
        let reported = PropertyMap::new().with("name", "web-2").with("groupID", "sg-1");
        props.merge(reported);

        assert_eq!(props.get("name"), Some(&PropertyValue::from("web-2")));
        assert_eq!(props.get("groupID"), Some(&PropertyValue::from("sg-1")));
        assert_eq!(props.get("local"), Some(&PropertyValue::Bool(true)));
    }

    #[test]
    fn json_view_drops_unknowns_and_keeps_integers() {
        let props = PropertyMap::new()
            .with("port", 443.0)
            .with("ratio", 0.5)
            .with("pending", PropertyValue::Unknown);
        let json = props.to_json();

        assert_eq!(json, serde_json::json!({"port": 443, "ratio": 0.5}));
        assert_eq!(PropertyMap::from_json(json).unwrap().len(), 2);
    }
}
