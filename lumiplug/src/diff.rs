//! Structural differences between property maps
//!
//! [`PropertyMap::diff`] compares an old and a new map and produces an
//! [`ObjectDiff`] listing added, deleted, unchanged and updated keys. Updated
//! arrays and objects carry a nested diff so callers can see exactly which
//! elements moved.

use crate::property::{PropertyKey, PropertyMap, PropertyValue};
use std::collections::BTreeMap;

/// Difference between two property maps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDiff {
    pub adds: PropertyMap,
    pub deletes: PropertyMap,
    pub sames: PropertyMap,
    pub updates: BTreeMap<PropertyKey, ValueDiff>,
}

/// Difference between two values stored under the same key
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDiff {
    pub old: PropertyValue,
    pub new: PropertyValue,
    /// Element-wise diff when both sides are arrays
    pub array: Option<ArrayDiff>,
    /// Key-wise diff when both sides are objects
    pub object: Option<ObjectDiff>,
}

/// Difference between two arrays, keyed by element index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayDiff {
    pub adds: BTreeMap<usize, PropertyValue>,
    pub deletes: BTreeMap<usize, PropertyValue>,
    pub sames: BTreeMap<usize, PropertyValue>,
    pub updates: BTreeMap<usize, ValueDiff>,
}

impl ObjectDiff {
    /// True if anything was added, deleted or updated
    pub fn any_changes(&self) -> bool {
        !self.adds.is_empty() || !self.deletes.is_empty() || !self.updates.is_empty()
    }

    pub fn added(&self, key: &str) -> bool {
        self.adds.contains_key(key)
    }

    pub fn deleted(&self, key: &str) -> bool {
        self.deletes.contains_key(key)
    }

    pub fn updated(&self, key: &str) -> bool {
        self.updates.contains_key(key)
    }

    /// True if the key was added, deleted or updated
    pub fn changed(&self, key: &str) -> bool {
        self.added(key) || self.deleted(key) || self.updated(key)
    }

    /// Every changed key, in key order
    pub fn changed_keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = self
            .adds
            .keys()
            .chain(self.deletes.keys())
            .chain(self.updates.keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl ArrayDiff {
    pub fn any_changes(&self) -> bool {
        !self.adds.is_empty() || !self.deletes.is_empty() || !self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.deletes.len() + self.sames.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PropertyMap {
    /// Diff against `new`, or `None` when the two maps are deeply equal
    ///
    /// A key whose old value is null and which is absent from `new` (or the
    /// reverse) is not a change.
    pub fn diff(&self, new: &PropertyMap) -> Option<ObjectDiff> {
        let mut diff = ObjectDiff::default();

        for (key, old) in self.iter() {
            match new.get(key) {
                Some(value) => match old.diff(value) {
                    Some(update) => {
                        diff.updates.insert(key.clone(), update);
                    }
                    None => {
                        diff.sames.insert(key.clone(), old.clone());
                    }
                },
                None if old.is_null() => {}
                None => {
                    diff.deletes.insert(key.clone(), old.clone());
                }
            }
        }

        for (key, value) in new.iter() {
            if !self.contains_key(key) && !value.is_null() {
                diff.adds.insert(key.clone(), value.clone());
            }
        }

        if diff.any_changes() {
            Some(diff)
        } else {
            None
        }
    }
}

impl PropertyValue {
    /// Diff against `new`, or `None` when the two values are deeply equal
    pub fn diff(&self, new: &PropertyValue) -> Option<ValueDiff> {
        match (self, new) {
            (PropertyValue::Array(old_items), PropertyValue::Array(new_items)) => {
                let array = diff_arrays(old_items, new_items)?;
                Some(ValueDiff {
                    old: self.clone(),
                    new: new.clone(),
                    array: Some(array),
                    object: None,
                })
            }
            (PropertyValue::Object(old_map), PropertyValue::Object(new_map)) => {
                let object = old_map.diff(new_map)?;
                Some(ValueDiff {
                    old: self.clone(),
                    new: new.clone(),
                    array: None,
                    object: Some(object),
                })
            }
            _ if self == new => None,
            _ => Some(ValueDiff {
                old: self.clone(),
                new: new.clone(),
                array: None,
                object: None,
            }),
        }
    }
}

fn diff_arrays(old: &[PropertyValue], new: &[PropertyValue]) -> Option<ArrayDiff> {
    let mut diff = ArrayDiff::default();

    for (i, old_item) in old.iter().enumerate() {
        match new.get(i) {
            Some(new_item) => match old_item.diff(new_item) {
                Some(update) => {
                    diff.updates.insert(i, update);
                }
                None => {
                    diff.sames.insert(i, old_item.clone());
                }
            },
            None => {
                diff.deletes.insert(i, old_item.clone());
            }
        }
    }

    for (i, new_item) in new.iter().enumerate().skip(old.len()) {
        diff.adds.insert(i, new_item.clone());
    }

    if diff.any_changes() {
        Some(diff)
    } else {
        None
    }
}
