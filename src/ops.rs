//! Store-backed operations with attached fetch plans
//!
//! Each operation wraps one backing-store primitive (get, query, insert)
//! and carries a single fetch plan. `fetch` is chainable and always
//! merges into that one plan — composing never produces a wrapper around
//! a wrapper. After the primitive succeeds, the loader expands the plan
//! over the result and the operation returns the linked graph together
//! with the identity map of everything it visited.

use serde_json::{Map, Value};

use crate::associations::AssociationRegistry;
use crate::codec::GraphValue;
use crate::context::ExecutionContext;
use crate::error::GraphResult;
use crate::loading::{GraphLoader, IdentityMap};
use crate::plan::{FetchPlan, TableSource};
use crate::record::{SharedRecord, Table};
use crate::store::BackingStore;

/// An operation result: the linked value plus the identity map of every
/// record the loader visited (the codec's encode input)
#[derive(Debug)]
pub struct Loaded {
    pub value: GraphValue,
    pub identity: IdentityMap,
}

async fn expand(
    cx: &ExecutionContext,
    store: &dyn BackingStore,
    registry: &AssociationRegistry,
    plan: &FetchPlan,
    records: Vec<SharedRecord>,
    many: bool,
) -> GraphResult<Loaded> {
    let loader = GraphLoader::new(registry, store);
    let requests = plan.requests_by_table();
    let identity = loader.fetch_associations(cx, &requests, &records).await?;

    // Hand back the canonical instances the identity map settled on.
    let mut canonical = Vec::with_capacity(records.len());
    for record in records {
        let qualified_id = record.qualified_id()?;
        canonical.push(identity.get(&qualified_id).cloned().unwrap_or(record));
    }
    let value = if many {
        GraphValue::Many(canonical)
    } else {
        // Store primitives for one-valued operations return exactly one
        // record, so the loader always seeds it.
        GraphValue::One(canonical.remove(0))
    };
    Ok(Loaded { value, identity })
}

/// Fetch exactly one record by id, then expand the plan over it
#[derive(Debug, Clone)]
pub struct GetOperation {
    table: Table,
    plan: FetchPlan,
}

impl GetOperation {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            plan: FetchPlan::new(),
        }
    }

    /// Request associations to fetch after the get succeeds; chainable
    pub fn fetch(mut self, table: impl Into<TableSource>, properties: &[&str]) -> Self {
        self.plan = self.plan.fetch(table, properties);
        self
    }

    /// Merge an existing plan onto this operation's plan (flattens)
    pub fn with_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = self.plan.merge(plan);
        self
    }

    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub async fn execute(
        &self,
        cx: &ExecutionContext,
        store: &dyn BackingStore,
        registry: &AssociationRegistry,
        id: &Value,
    ) -> GraphResult<Loaded> {
        tracing::debug!(trace_id = %cx.trace_id(), table = self.table.name(), "get operation");
        let record = store.get(cx, &self.table, id).await?;
        expand(cx, store, registry, &self.plan, vec![record], false).await
    }
}

/// Query records by equality predicate, then expand the plan over them
#[derive(Debug, Clone)]
pub struct QueryOperation {
    table: Table,
    plan: FetchPlan,
}

impl QueryOperation {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            plan: FetchPlan::new(),
        }
    }

    /// Request associations to fetch after the query succeeds; chainable
    pub fn fetch(mut self, table: impl Into<TableSource>, properties: &[&str]) -> Self {
        self.plan = self.plan.fetch(table, properties);
        self
    }

    /// Merge an existing plan onto this operation's plan (flattens)
    pub fn with_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = self.plan.merge(plan);
        self
    }

    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub async fn execute(
        &self,
        cx: &ExecutionContext,
        store: &dyn BackingStore,
        registry: &AssociationRegistry,
        predicate: &Map<String, Value>,
    ) -> GraphResult<Loaded> {
        tracing::debug!(trace_id = %cx.trace_id(), table = self.table.name(), "query operation");
        let records = store.query(cx, &self.table, predicate).await?;
        expand(cx, store, registry, &self.plan, records, true).await
    }
}

/// Insert a record, then expand the plan over it
#[derive(Debug, Clone)]
pub struct CreateOperation {
    table: Table,
    plan: FetchPlan,
}

impl CreateOperation {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            plan: FetchPlan::new(),
        }
    }

    /// Request associations to fetch after the insert succeeds; chainable
    pub fn fetch(mut self, table: impl Into<TableSource>, properties: &[&str]) -> Self {
        self.plan = self.plan.fetch(table, properties);
        self
    }

    /// Merge an existing plan onto this operation's plan (flattens)
    pub fn with_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = self.plan.merge(plan);
        self
    }

    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub async fn execute(
        &self,
        cx: &ExecutionContext,
        store: &dyn BackingStore,
        registry: &AssociationRegistry,
        props: Map<String, Value>,
    ) -> GraphResult<Loaded> {
        tracing::debug!(trace_id = %cx.trace_id(), table = self.table.name(), "create operation");
        let record = store.insert(cx, &self.table, props).await?;
        expand(cx, store, registry, &self.plan, vec![record], false).await
    }
}
