//! In-memory AWS account
//!
//! Stands in for the EC2 and API Gateway endpoints. Each resource kind has its
//! own [`Table`]; IDs are allocated from one account-wide counter using the
//! prefixes AWS uses (`sg-`, `rtb-`, ...).

use lumiplug::{Id, ProviderError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::apigateway::ApiKey;
use crate::ec2::{RouteTable, SecurityGroup, SecurityGroupEgress};

/// Rows of one resource kind, keyed by ID
#[derive(Debug)]
pub struct Table<T> {
    kind: &'static str,
    rows: RwLock<BTreeMap<Id, T>>,
}

impl<T: Clone> Table<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, id: Id, row: T) -> Result<(), ProviderError> {
        let mut rows = self.write()?;
        if rows.contains_key(&id) {
            return Err(ProviderError::Conflict(format!("{} {} already exists", self.kind, id)));
        }
        rows.insert(id, row);
        Ok(())
    }

    pub fn get(&self, id: &Id) -> Result<T, ProviderError> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.read().map(|rows| rows.contains_key(id)).unwrap_or(false)
    }

    /// Replaces an existing row
    pub fn put(&self, id: &Id, row: T) -> Result<(), ProviderError> {
        let mut rows = self.write()?;
        match rows.get_mut(id) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(self.not_found(id)),
        }
    }

    pub fn remove(&self, id: &Id) -> Result<T, ProviderError> {
        self.write()?.remove(id).ok_or_else(|| self.not_found(id))
    }

    /// IDs of the rows matching `pred`
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<Id> {
        self.read()
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| pred(row))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self, id: &Id) -> ProviderError {
        ProviderError::NotFound(format!("{} {} does not exist", self.kind, id))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Id, T>>, ProviderError> {
        self.rows
            .read()
            .map_err(|_| ProviderError::Failed(format!("{} table is poisoned", self.kind)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Id, T>>, ProviderError> {
        self.rows
            .write()
            .map_err(|_| ProviderError::Failed(format!("{} table is poisoned", self.kind)))
    }
}

/// One account's worth of resources
#[derive(Debug)]
pub struct Cloud {
    next_id: AtomicU64,
    pub security_groups: Table<SecurityGroup>,
    pub security_group_egress: Table<SecurityGroupEgress>,
    pub route_tables: Table<RouteTable>,
    pub api_keys: Table<ApiKey>,
}

impl Default for Cloud {
    fn default() -> Self {
        Self::new()
    }
}

impl Cloud {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            security_groups: Table::new("security group"),
            security_group_egress: Table::new("security group egress rule"),
            route_tables: Table::new("route table"),
            api_keys: Table::new("API key"),
        }
    }

    /// Allocates a fresh ID such as `sg-0000000000000001`
    pub fn allocate(&self, prefix: &str) -> Id {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Id::new(format!("{}-{:016x}", prefix, n))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let cloud = Cloud::new();
        let a = cloud.allocate("sg");
        let b = cloud.allocate("rtb");
        assert_eq!(a.as_str(), "sg-0000000000000001");
        assert_eq!(b.as_str(), "rtb-0000000000000002");
    }

    #[test]
    fn table_reports_missing_and_duplicate_rows() {
        let table: Table<String> = Table::new("widget");
        let id = Id::new("w-1");

        table.insert(id.clone(), "one".to_string()).unwrap();
        assert!(matches!(
            table.insert(id.clone(), "again".to_string()),
            Err(ProviderError::Conflict(_))
        ));

        table.put(&id, "two".to_string()).unwrap();
        assert_eq!(table.get(&id).unwrap(), "two");
        assert_eq!(table.find(|row| row == "two"), vec![id.clone()]);

        table.remove(&id).unwrap();
        assert!(table.is_empty());
        match table.get(&id) {
            Err(ProviderError::NotFound(message)) => assert_eq!(message, "widget w-1 does not exist"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(table.put(&id, String::new()), Err(ProviderError::NotFound(_))));
    }
}
