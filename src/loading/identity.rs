//! Scope-local identity map
//!
//! One in-memory instance per qualified id within a single load or encode
//! operation. Never global and never shared between operations, which is
//! why this is a plain map rather than a concurrent one.

use std::collections::HashMap;

use crate::error::GraphResult;
use crate::record::SharedRecord;

/// Mapping from qualified id (`table:id`) to the canonical record instance
#[derive(Debug, Default)]
pub struct IdentityMap {
    records: HashMap<String, SharedRecord>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// The canonical instance for a qualified id, if registered
    pub fn get(&self, qualified_id: &str) -> Option<&SharedRecord> {
        self.records.get(qualified_id)
    }

    pub fn contains(&self, qualified_id: &str) -> bool {
        self.records.contains_key(qualified_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over every (qualified id, record) pair
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SharedRecord)> {
        self.records.iter()
    }

    /// Register a record or return the already-canonical instance for its
    /// qualified id. The boolean is true when the record was newly
    /// registered. This is the loader's critical section: callers must
    /// invoke it serially so exactly one canonical instance exists.
    pub(crate) fn canonicalize(
        &mut self,
        record: SharedRecord,
    ) -> GraphResult<(SharedRecord, bool)> {
        let qualified_id = record.qualified_id()?;
        match self.records.get(&qualified_id) {
            Some(existing) => Ok((existing.clone(), false)),
            None => {
                self.records.insert(qualified_id, record.clone());
                Ok((record, true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, Table};
    use serde_json::{json, Map};

    fn record(table: &str, id: &str) -> SharedRecord {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(id));
        SharedRecord::new(Record::new(Table::new(table), fields))
    }

    #[test]
    fn test_first_registration_is_canonical() {
        let mut map = IdentityMap::new();
        let first = record("Order", "1");
        let duplicate = record("Order", "1");

        let (canonical, fresh) = map.canonicalize(first.clone()).unwrap();
        assert!(fresh);
        assert!(canonical.ptr_eq(&first));

        let (canonical, fresh) = map.canonicalize(duplicate.clone()).unwrap();
        assert!(!fresh);
        assert!(canonical.ptr_eq(&first));
        assert!(!canonical.ptr_eq(&duplicate));

        assert_eq!(map.len(), 1);
        assert!(map.contains("Order:1"));
    }

    #[test]
    fn test_distinct_qualified_ids_coexist() {
        let mut map = IdentityMap::new();
        map.canonicalize(record("Order", "1")).unwrap();
        map.canonicalize(record("OrderItem", "1")).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get("OrderItem:1").is_some());
    }
}
