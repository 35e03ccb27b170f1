//! Association registry: per-table declared relationship metadata
//!
//! Registration is explicit and two-phase: construct the table
//! descriptors first, then declare every relationship between them.
//! Built once at startup and treated as read-only afterwards; `clear`
//! exists for test isolation only.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::associations::metadata::Association;
use crate::error::{GraphError, GraphResult};
use crate::record::{SharedRecord, Table};

/// Thread-safe registry mapping table name -> property -> association
#[derive(Debug, Default)]
pub struct AssociationRegistry {
    associations: DashMap<String, HashMap<String, Association>>,
}

impl AssociationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            associations: DashMap::new(),
        }
    }

    /// Register a relationship under its source table and property.
    /// Re-declaring an existing (table, property) pair is rejected: the
    /// registry is immutable after first population.
    pub fn declare(&self, association: Association) -> GraphResult<()> {
        let mut table_associations = self
            .associations
            .entry(association.source.name().to_string())
            .or_insert_with(HashMap::new);

        if table_associations.contains_key(&association.property) {
            return Err(GraphError::Declaration(format!(
                "association {}.{} already declared",
                association.source.name(),
                association.property
            )));
        }
        table_associations.insert(association.property.clone(), association);
        Ok(())
    }

    /// Declare a to-many relationship from `source` to `destination`
    pub fn to_many(
        &self,
        source: &Table,
        destination: &Table,
        property: &str,
    ) -> GraphResult<()> {
        self.declare(Association::to_many(
            source.clone(),
            destination.clone(),
            property,
        ))
    }

    /// Declare a to-one relationship from `source` to `destination`
    pub fn to_one(&self, source: &Table, destination: &Table, property: &str) -> GraphResult<()> {
        self.declare(Association::to_one(
            source.clone(),
            destination.clone(),
            property,
        ))
    }

    /// All declared associations of a table, keyed by property name
    pub fn associations_of(&self, table: &Table) -> HashMap<String, Association> {
        self.associations
            .get(table.name())
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Look up one association or fail naming the table and property
    pub fn resolve(&self, table: &Table, property: &str) -> GraphResult<Association> {
        self.associations
            .get(table.name())
            .and_then(|entry| entry.get(property).cloned())
            .ok_or_else(|| {
                GraphError::Declaration(format!(
                    "association {}.{} not declared",
                    table.name(),
                    property
                ))
            })
    }

    /// Whether a (table, property) pair is declared
    pub fn has_association(&self, table: &Table, property: &str) -> bool {
        self.associations
            .get(table.name())
            .map(|entry| entry.contains_key(property))
            .unwrap_or(false)
    }

    /// Total number of declared associations
    pub fn len(&self) -> usize {
        self.associations.iter().map(|entry| entry.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark every declared property of the record's table as an
    /// unfetched slot. Fetched slots are never demoted.
    pub(crate) fn attach_guards(&self, record: &SharedRecord) {
        let table = record.table();
        if let Some(entry) = self.associations.get(table.name()) {
            let mut guard = record.write();
            for property in entry.keys() {
                guard.guard(property);
            }
        }
    }

    /// Drop every declaration; test isolation only
    pub fn clear(&self) {
        self.associations.clear();
    }
}
