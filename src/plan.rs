//! Fetch plans: the ordered association requests attached to an operation
//!
//! A plan is a flat, ordered list of (table, property) requests. Composing
//! plans always flattens onto one list — chained `fetch` calls and merged
//! plans never produce nested wrappers. A request's table may be deferred
//! behind a provider closure to break circular type references; the
//! provider runs at most once per plan and its result is cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::record::Table;

/// A table reference that is either known up front or resolved lazily
#[derive(Clone)]
pub enum TableSource {
    Named(Table),
    Deferred(DeferredTable),
}

impl TableSource {
    /// The concrete table behind this source
    pub fn resolve(&self) -> Table {
        match self {
            TableSource::Named(table) => table.clone(),
            TableSource::Deferred(deferred) => deferred.resolve().clone(),
        }
    }
}

impl From<Table> for TableSource {
    fn from(table: Table) -> Self {
        TableSource::Named(table)
    }
}

impl From<&Table> for TableSource {
    fn from(table: &Table) -> Self {
        TableSource::Named(table.clone())
    }
}

impl From<DeferredTable> for TableSource {
    fn from(deferred: DeferredTable) -> Self {
        TableSource::Deferred(deferred)
    }
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Named(table) => write!(f, "Named({})", table.name()),
            TableSource::Deferred(deferred) => deferred.fmt(f),
        }
    }
}

/// A table provider resolved once and cached
#[derive(Clone)]
pub struct DeferredTable {
    inner: Arc<DeferredInner>,
}

struct DeferredInner {
    resolver: Box<dyn Fn() -> Table + Send + Sync>,
    resolved: OnceCell<Table>,
}

impl DeferredTable {
    pub fn new(resolver: impl Fn() -> Table + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(DeferredInner {
                resolver: Box::new(resolver),
                resolved: OnceCell::new(),
            }),
        }
    }

    /// Run the provider on first use; later calls return the cached table
    pub fn resolve(&self) -> &Table {
        self.inner.resolved.get_or_init(|| (self.inner.resolver)())
    }
}

impl fmt::Debug for DeferredTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.resolved.get() {
            Some(table) => write!(f, "Deferred({})", table.name()),
            None => f.write_str("Deferred(<unresolved>)"),
        }
    }
}

/// One (table, property) association request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub table: TableSource,
    pub property: String,
}

/// Ordered, composable list of association requests
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    requests: Vec<FetchRequest>,
}

impl FetchPlan {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Append requests for `properties` of `table`; chainable
    pub fn fetch(mut self, table: impl Into<TableSource>, properties: &[&str]) -> Self {
        let source = table.into();
        for property in properties {
            self.requests.push(FetchRequest {
                table: source.clone(),
                property: (*property).to_string(),
            });
        }
        self
    }

    /// Flatten another plan onto this one. Merging is list concatenation,
    /// never nesting.
    pub fn merge(mut self, other: FetchPlan) -> Self {
        self.requests.extend(other.requests);
        self
    }

    pub fn requests(&self) -> &[FetchRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Resolve every table source and group property names per table,
    /// dropping repeated (table, property) pairs while keeping
    /// first-seen order.
    pub fn requests_by_table(&self) -> HashMap<String, Vec<String>> {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for request in &self.requests {
            let table = request.table.resolve();
            let properties = grouped.entry(table.name().to_string()).or_default();
            if !properties.contains(&request.property) {
                properties.push(request.property.clone());
            }
        }
        grouped
    }
}
