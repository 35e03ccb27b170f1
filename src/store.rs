//! Backing-store collaborator contract and an in-memory implementation
//!
//! The core never builds queries beyond equality predicates; everything
//! else about storage (retries, transactions, indexing) belongs to the
//! collaborator behind this trait.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::{GraphError, GraphResult};
use crate::record::{Record, SharedRecord, Table};

/// Store operations consumed by the loader and the operation layer
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Return every record of `table` whose fields match all predicate
    /// pairs. An empty predicate matches the whole table.
    async fn query(
        &self,
        cx: &ExecutionContext,
        table: &Table,
        predicate: &Map<String, Value>,
    ) -> GraphResult<Vec<SharedRecord>>;

    /// Insert a row and return the stored record
    async fn insert(
        &self,
        cx: &ExecutionContext,
        table: &Table,
        props: Map<String, Value>,
    ) -> GraphResult<SharedRecord>;

    /// Fetch exactly one record by id; 0 or more than 1 match fails
    async fn get(
        &self,
        cx: &ExecutionContext,
        table: &Table,
        id: &Value,
    ) -> GraphResult<SharedRecord> {
        let mut predicate = Map::new();
        predicate.insert("id".to_string(), id.clone());
        let mut records = self.query(cx, table, &predicate).await?;
        match records.len() {
            1 => Ok(records.remove(0)),
            0 => Err(GraphError::Cardinality(format!(
                "{} found 0 matches for id {}",
                table.name(),
                id
            ))),
            n => Err(GraphError::Cardinality(format!(
                "{} found {} matches for id {}",
                table.name(),
                n,
                id
            ))),
        }
    }
}

/// In-memory table storage for tests and local development
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Number of rows currently stored in `table`
    pub fn row_count(&self, table: &Table) -> usize {
        self.tables
            .get(table.name())
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Drop every row in every table
    pub fn clear(&self) {
        self.tables.clear();
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn query(
        &self,
        cx: &ExecutionContext,
        table: &Table,
        predicate: &Map<String, Value>,
    ) -> GraphResult<Vec<SharedRecord>> {
        let rows = self
            .tables
            .get(table.name())
            .map(|rows| rows.clone())
            .unwrap_or_default();

        let matches: Vec<SharedRecord> = rows
            .into_iter()
            .filter(|row| predicate.iter().all(|(key, value)| row.get(key) == Some(value)))
            .map(|row| SharedRecord::new(Record::new(table.clone(), row)))
            .collect();

        tracing::trace!(
            trace_id = %cx.trace_id(),
            table = table.name(),
            matches = matches.len(),
            "memory store query"
        );
        Ok(matches)
    }

    async fn insert(
        &self,
        cx: &ExecutionContext,
        table: &Table,
        mut props: Map<String, Value>,
    ) -> GraphResult<SharedRecord> {
        if !props.contains_key("id") {
            props.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        self.tables
            .entry(table.name().to_string())
            .or_insert_with(Vec::new)
            .push(props.clone());

        tracing::trace!(
            trace_id = %cx.trace_id(),
            table = table.name(),
            "memory store insert"
        );
        Ok(SharedRecord::new(Record::new(table.clone(), props)))
    }
}
