//! Breadth-first association expansion over a result set
//!
//! The loader walks wave by wave: every record in the frontier has its
//! requested associations resolved, related records are canonicalized
//! through the identity map, and only newly discovered records enter the
//! next frontier. A qualified id seen twice reuses the canonical instance
//! and is never re-fetched, which both deduplicates shared nodes and
//! terminates cycles.
//!
//! Within a wave the per-record fetches are independent and run
//! concurrently; integrating their results into the identity map is the
//! serialized critical section, applied in wave order so the final map is
//! deterministic regardless of fetch interleaving.

use std::collections::HashMap;

use futures::future;

use crate::associations::{Association, AssociationRegistry};
use crate::context::ExecutionContext;
use crate::error::GraphResult;
use crate::loading::identity::IdentityMap;
use crate::record::{AssociationValue, SharedRecord};
use crate::store::BackingStore;

/// Resolves a fetch plan's requests over an initial result set
pub struct GraphLoader<'a> {
    registry: &'a AssociationRegistry,
    store: &'a dyn BackingStore,
}

impl<'a> GraphLoader<'a> {
    pub fn new(registry: &'a AssociationRegistry, store: &'a dyn BackingStore) -> Self {
        Self { registry, store }
    }

    /// Expand `requests` (property names grouped by table name) over the
    /// initial records, returning the identity map of every record
    /// visited. Association slots are populated on the records in place;
    /// the initial records' canonical instances seed the map.
    ///
    /// An undeclared requested property aborts the whole operation before
    /// any fetch of its wave runs. On failure, assignments from earlier
    /// waves remain in place; there is no rollback.
    pub async fn fetch_associations(
        &self,
        cx: &ExecutionContext,
        requests: &HashMap<String, Vec<String>>,
        initial_records: &[SharedRecord],
    ) -> GraphResult<IdentityMap> {
        let mut identity = IdentityMap::new();
        let mut frontier = Vec::with_capacity(initial_records.len());
        for record in initial_records {
            let (canonical, fresh) = identity.canonicalize(record.clone())?;
            if fresh {
                self.registry.attach_guards(&canonical);
                frontier.push(canonical);
            }
        }

        let mut wave = 0usize;
        while !frontier.is_empty() {
            // Resolve every requested association up front so an
            // undeclared property fails before any fetch is issued.
            let mut jobs: Vec<(SharedRecord, Association)> = Vec::new();
            for record in &frontier {
                let table = record.table();
                let Some(properties) = requests.get(table.name()) else {
                    continue;
                };
                for property in properties {
                    if record.is_fetched(property) {
                        continue;
                    }
                    let association = self.registry.resolve(&table, property)?;
                    jobs.push((record.clone(), association));
                }
            }
            if jobs.is_empty() {
                break;
            }

            tracing::debug!(
                trace_id = %cx.trace_id(),
                wave,
                frontier = frontier.len(),
                fetches = jobs.len(),
                "expanding association wave"
            );

            let fetches = jobs
                .iter()
                .map(|(record, association)| association.fetch(cx, self.store, record));
            let resolved = future::try_join_all(fetches).await?;

            // Identity-map integration: serial, in wave order.
            let mut next_frontier = Vec::new();
            for ((record, association), value) in jobs.into_iter().zip(resolved) {
                let value = match value {
                    AssociationValue::One(related) => {
                        let canonical =
                            self.integrate(&mut identity, related, &mut next_frontier)?;
                        AssociationValue::One(canonical)
                    }
                    AssociationValue::Many(related) => {
                        let mut canonicals = Vec::with_capacity(related.len());
                        for related_record in related {
                            canonicals.push(self.integrate(
                                &mut identity,
                                related_record,
                                &mut next_frontier,
                            )?);
                        }
                        AssociationValue::Many(canonicals)
                    }
                };
                record.write().fulfill(&association.property, value)?;
            }

            frontier = next_frontier;
            wave += 1;
        }

        tracing::debug!(
            trace_id = %cx.trace_id(),
            waves = wave,
            records = identity.len(),
            "association expansion complete"
        );
        Ok(identity)
    }

    /// Canonicalize a related record; only a newly registered record is
    /// guarded and enqueued, so every reachable record is visited once.
    fn integrate(
        &self,
        identity: &mut IdentityMap,
        related: SharedRecord,
        next_frontier: &mut Vec<SharedRecord>,
    ) -> GraphResult<SharedRecord> {
        let (canonical, fresh) = identity.canonicalize(related)?;
        if fresh {
            self.registry.attach_guards(&canonical);
            next_frontier.push(canonical.clone());
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::record::Table;
    use crate::store::MemoryStore;
    use serde_json::{json, Map, Value};

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_undeclared_request_aborts_before_fetching() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let order = Table::new("Order");
        let registry = AssociationRegistry::new();

        let root = store
            .insert(&cx, &order, props(&[("id", json!("1"))]))
            .await
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("Order".to_string(), vec!["items".to_string()]);

        let loader = GraphLoader::new(&registry, &store);
        let err = loader
            .fetch_associations(&cx, &requests, &[root.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Declaration(_)));
        // The root keeps its guard; nothing was partially assigned.
        assert!(!root.is_fetched("items"));
    }

    #[tokio::test]
    async fn test_shared_child_loaded_once() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let item = Table::new("OrderItem");
        let product = Table::new("Product");
        let registry = AssociationRegistry::new();
        registry.to_one(&item, &product, "product").unwrap();

        store
            .insert(&cx, &product, props(&[("id", json!("p1"))]))
            .await
            .unwrap();
        let first = store
            .insert(
                &cx,
                &item,
                props(&[("id", json!("i1")), ("productId", json!("p1"))]),
            )
            .await
            .unwrap();
        let second = store
            .insert(
                &cx,
                &item,
                props(&[("id", json!("i2")), ("productId", json!("p1"))]),
            )
            .await
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("OrderItem".to_string(), vec!["product".to_string()]);

        let loader = GraphLoader::new(&registry, &store);
        let identity = loader
            .fetch_associations(&cx, &requests, &[first.clone(), second.clone()])
            .await
            .unwrap();

        // Two items plus one shared product: three canonical records.
        assert_eq!(identity.len(), 3);
        let product_of_first = first.association("product").unwrap().one().unwrap();
        let product_of_second = second.association("product").unwrap().one().unwrap();
        assert!(product_of_first.ptr_eq(&product_of_second));
    }

    #[tokio::test]
    async fn test_duplicate_roots_canonicalized() {
        let store = MemoryStore::new();
        let cx = ExecutionContext::new();
        let order = Table::new("Order");
        let registry = AssociationRegistry::new();

        store
            .insert(&cx, &order, props(&[("id", json!("1"))]))
            .await
            .unwrap();
        let roots = store.query(&cx, &order, &Map::new()).await.unwrap();
        let duplicate = store.query(&cx, &order, &Map::new()).await.unwrap();

        let loader = GraphLoader::new(&registry, &store);
        let identity = loader
            .fetch_associations(
                &cx,
                &HashMap::new(),
                &[roots[0].clone(), duplicate[0].clone()],
            )
            .await
            .unwrap();
        assert_eq!(identity.len(), 1);
    }
}
