//! Association metadata and per-relationship resolution
//!
//! An association knows how to resolve itself for one source record by
//! issuing a single equality query against the backing store. To-many
//! follows the source table's conventional foreign key on the destination;
//! to-one reads `{property}Id` off the source and requires exactly one
//! destination match.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::context::ExecutionContext;
use crate::error::{GraphError, GraphResult};
use crate::record::{AssociationValue, SharedRecord, Table};
use crate::store::BackingStore;

/// The kind of a declared relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// One source record owns many destination records (hasMany)
    ToMany,
    /// One source record references exactly one destination record (belongsTo)
    ToOne,
}

impl AssociationKind {
    /// Returns true if this kind resolves to a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::ToMany)
    }
}

/// A declared relationship between two tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// The kind of relationship
    pub kind: AssociationKind,

    /// Table the relationship is declared on
    pub source: Table,

    /// Table the relationship resolves into
    pub destination: Table,

    /// For `ToMany`: the destination column holding the source id.
    /// For `ToOne`: the source field holding the destination id.
    pub foreign_key: String,

    /// Property name owning the relationship on the source record
    pub property: String,
}

impl Association {
    /// Declare a to-many relationship; the foreign key follows the
    /// source table's naming convention (`Order` -> `orderId`).
    pub fn to_many(source: Table, destination: Table, property: impl Into<String>) -> Self {
        let foreign_key = source.foreign_key();
        Self {
            kind: AssociationKind::ToMany,
            source,
            destination,
            foreign_key,
            property: property.into(),
        }
    }

    /// Declare a to-one relationship; the source record carries the
    /// destination id in `{property}Id`.
    pub fn to_one(source: Table, destination: Table, property: impl Into<String>) -> Self {
        let property = property.into();
        Self {
            kind: AssociationKind::ToOne,
            foreign_key: format!("{}Id", property),
            source,
            destination,
            property,
        }
    }

    /// Resolve this relationship for one source record
    pub async fn fetch(
        &self,
        cx: &ExecutionContext,
        store: &dyn BackingStore,
        source: &SharedRecord,
    ) -> GraphResult<AssociationValue> {
        match self.kind {
            AssociationKind::ToMany => {
                let mut predicate = Map::new();
                predicate.insert(self.foreign_key.clone(), source.id()?);
                let records = store.query(cx, &self.destination, &predicate).await?;
                // Zero matches is a valid empty collection, not an error.
                Ok(AssociationValue::Many(records))
            }
            AssociationKind::ToOne => {
                let key = source.field(&self.foreign_key).ok_or_else(|| {
                    GraphError::Declaration(format!(
                        "{}.{} has no foreign-key field '{}'",
                        self.source.name(),
                        self.property,
                        self.foreign_key
                    ))
                })?;
                let mut predicate = Map::new();
                predicate.insert("id".to_string(), key);
                let mut records = store.query(cx, &self.destination, &predicate).await?;
                if records.len() != 1 {
                    return Err(GraphError::Cardinality(format!(
                        "{}.{} resolved {} records in {}, expected exactly 1",
                        self.source.name(),
                        self.property,
                        records.len(),
                        self.destination.name()
                    )));
                }
                Ok(AssociationValue::One(records.remove(0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_foreign_key_naming() {
        let assoc = Association::to_many(Table::new("Order"), Table::new("OrderItem"), "items");
        assert_eq!(assoc.foreign_key, "orderId");
        assert!(assoc.kind.is_collection());

        let back = Association::to_one(Table::new("OrderItem"), Table::new("Order"), "order");
        assert_eq!(back.foreign_key, "orderId");
        assert!(!back.kind.is_collection());

        let parent = Association::to_one(Table::new("Node"), Table::new("Node"), "parent");
        assert_eq!(parent.foreign_key, "parentId");
    }

    #[tokio::test]
    async fn test_to_many_fetch_counts() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let order = Table::new("Order");
        let item = Table::new("OrderItem");

        let source = store
            .insert(&cx, &order, props(&[("id", json!("1"))]))
            .await
            .unwrap();
        store
            .insert(&cx, &item, props(&[("orderId", json!("1"))]))
            .await
            .unwrap();
        store
            .insert(&cx, &item, props(&[("orderId", json!("1"))]))
            .await
            .unwrap();
        store
            .insert(&cx, &item, props(&[("orderId", json!("2"))]))
            .await
            .unwrap();

        let assoc = Association::to_many(order.clone(), item.clone(), "items");
        let value = assoc.fetch(&cx, &store, &source).await.unwrap();
        assert_eq!(value.many().unwrap().len(), 2);

        // No children resolves to an empty list, not an error.
        let lonely = store
            .insert(&cx, &order, props(&[("id", json!("9"))]))
            .await
            .unwrap();
        let value = assoc.fetch(&cx, &store, &lonely).await.unwrap();
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn test_to_one_cardinality() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let order = Table::new("Order");
        let item = Table::new("OrderItem");
        let assoc = Association::to_one(item.clone(), order.clone(), "order");

        // Dangling reference: 0 matches.
        let dangling = store
            .insert(&cx, &item, props(&[("orderId", json!("missing"))]))
            .await
            .unwrap();
        let err = assoc.fetch(&cx, &store, &dangling).await.unwrap_err();
        assert!(matches!(err, GraphError::Cardinality(_)));

        store
            .insert(&cx, &order, props(&[("id", json!("1"))]))
            .await
            .unwrap();
        let linked = store
            .insert(&cx, &item, props(&[("orderId", json!("1"))]))
            .await
            .unwrap();
        let value = assoc.fetch(&cx, &store, &linked).await.unwrap();
        assert_eq!(value.one().unwrap().qualified_id().unwrap(), "Order:1");

        // More than one match fails as well.
        store
            .insert(&cx, &order, props(&[("id", json!("1"))]))
            .await
            .unwrap();
        let err = assoc.fetch(&cx, &store, &linked).await.unwrap_err();
        assert!(matches!(err, GraphError::Cardinality(_)));
    }

    #[tokio::test]
    async fn test_to_one_missing_foreign_key_field() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let item = Table::new("OrderItem");
        let order = Table::new("Order");

        let record = store.insert(&cx, &item, Map::new()).await.unwrap();
        let assoc = Association::to_one(item, order, "order");
        let err = assoc.fetch(&cx, &store, &record).await.unwrap_err();
        assert!(matches!(err, GraphError::Declaration(_)));
        assert!(err.to_string().contains("orderId"));
    }
}
