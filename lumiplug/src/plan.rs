//! Change planning: deciding between update and replacement
//!
//! A plan starts from the [`ObjectDiff`] of old and new properties. Changed
//! keys that the resource schema lists as replace triggers go into the
//! [`ReplacePlan`] first, in declaration order, followed by any keys the
//! provider flagged itself. A key appears at most once.

use crate::diff::ObjectDiff;
use crate::property::{PropertyKey, PropertyMap};
use crate::schema::ResourceSchema;
use std::fmt;

/// Ordered, de-duplicated keys whose change forces replacement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplacePlan {
    keys: Vec<PropertyKey>,
}

impl ReplacePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a key unless it is already present
    pub fn push(&mut self, key: impl Into<PropertyKey>) {
        let key = key.into();
        if !self.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn extend<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<PropertyKey>,
    {
        for key in keys {
            self.push(key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[PropertyKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn into_keys(self) -> Vec<PropertyKey> {
        self.keys
    }
}

impl<K: Into<PropertyKey>> FromIterator<K> for ReplacePlan {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut plan = ReplacePlan::new();
        plan.extend(iter);
        plan
    }
}

/// What the executor has to do with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    None,
    Update,
    Replace,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::None => f.write_str("none"),
            ChangeAction::Update => f.write_str("update"),
            ChangeAction::Replace => f.write_str("replace"),
        }
    }
}

/// Outcome of inspecting a proposed change
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePlan {
    /// `None` when old and new are deeply equal
    pub diff: Option<ObjectDiff>,
    pub replaces: ReplacePlan,
    /// Property values the provider computed for the new state
    pub changes: PropertyMap,
    pub action: ChangeAction,
}

impl ChangePlan {
    /// Plan for identical old and new properties
    pub fn unchanged() -> Self {
        Self {
            diff: None,
            replaces: ReplacePlan::new(),
            changes: PropertyMap::new(),
            action: ChangeAction::None,
        }
    }

    pub fn requires_replacement(&self) -> bool {
        self.action == ChangeAction::Replace
    }

    /// Top-level keys that differ between old and new
    pub fn changed_keys(&self) -> Vec<PropertyKey> {
        self.diff
            .as_ref()
            .map(ObjectDiff::changed_keys)
            .unwrap_or_default()
    }
}

/// Changed keys that the schema declares as replace triggers, in schema order
pub fn static_replaces(schema: &ResourceSchema, diff: &ObjectDiff) -> ReplacePlan {
    schema
        .replaces
        .iter()
        .filter(|key| diff.changed(key))
        .cloned()
        .collect()
}

/// Combines the diff, the schema's static triggers and the provider's own
/// triggers into a plan
pub fn plan_change<I>(
    schema: Option<&ResourceSchema>,
    diff: Option<ObjectDiff>,
    dynamic_replaces: I,
    changes: PropertyMap,
) -> ChangePlan
where
    I: IntoIterator<Item = PropertyKey>,
{
    let Some(diff) = diff else {
        return ChangePlan::unchanged();
    };

    let mut replaces = schema
        .map(|schema| static_replaces(schema, &diff))
        .unwrap_or_default();
    replaces.extend(dynamic_replaces);

    let action = if !replaces.is_empty() {
        ChangeAction::Replace
    } else if diff.any_changes() {
        ChangeAction::Update
    } else {
        ChangeAction::None
    };

    ChangePlan {
        diff: Some(diff),
        replaces,
        changes,
        action,
    }
}
