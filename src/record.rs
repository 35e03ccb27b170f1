//! Records, tables, and guarded association slots
//!
//! A record is identified by (table, id) and holds its scalar fields as a
//! JSON object plus a slot per declared association. Slots are tagged
//! `Unfetched` or `Fetched`: reading an unfetched association is a defined
//! `Access` error, never a silent empty value, and only the loader (or the
//! codec on decode) transitions a slot. The transition is one-way.
//!
//! Association values are excluded from a record's `Serialize` output so
//! that structural serialization can never wander into a cyclic graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};

/// Entity-type descriptor; the name drives the foreign-key convention
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Conventional foreign-key column pointing at this table:
    /// lower-cased first letter plus the rest of the name plus `Id`
    /// (table `Order` -> `orderId`).
    pub fn foreign_key(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => format!("{}{}Id", first.to_lowercase(), chars.as_str()),
            None => "Id".to_string(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Build the `table:id` key identifying a record across a graph
pub fn qualified_id(table: &str, id: &Value) -> String {
    match id {
        Value::String(s) => format!("{}:{}", table, s),
        other => format!("{}:{}", table, other),
    }
}

/// Loading state of one association slot
#[derive(Debug, Clone)]
pub enum AssociationSlot {
    /// Declared but never fetched; reads fail
    Unfetched,
    /// Populated exactly once by the loader or codec
    Fetched(AssociationValue),
}

/// A resolved association: one record or a list, per the relationship kind
#[derive(Clone)]
pub enum AssociationValue {
    One(SharedRecord),
    Many(Vec<SharedRecord>),
}

impl AssociationValue {
    /// Number of records carried by this value
    pub fn len(&self) -> usize {
        match self {
            AssociationValue::One(_) => 1,
            AssociationValue::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single record of a to-one value
    pub fn one(&self) -> GraphResult<SharedRecord> {
        match self {
            AssociationValue::One(record) => Ok(record.clone()),
            AssociationValue::Many(_) => Err(GraphError::Cardinality(
                "expected a to-one association value, got a collection".to_string(),
            )),
        }
    }

    /// The record list of a to-many value
    pub fn many(&self) -> GraphResult<Vec<SharedRecord>> {
        match self {
            AssociationValue::Many(records) => Ok(records.clone()),
            AssociationValue::One(_) => Err(GraphError::Cardinality(
                "expected a to-many association value, got a single record".to_string(),
            )),
        }
    }
}

// Association values can be cyclic; Debug must not traverse them.
impl fmt::Debug for AssociationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationValue::One(_) => f.write_str("One(..)"),
            AssociationValue::Many(records) => write!(f, "Many(len={})", records.len()),
        }
    }
}

/// An entity instance: (table, id) plus fields and association slots
pub struct Record {
    table: Table,
    fields: Map<String, Value>,
    associations: HashMap<String, AssociationSlot>,
}

impl Record {
    /// Create a record from its table and field object; the `id` field
    /// lives inside `fields`. No association slots are attached yet.
    pub fn new(table: Table, fields: Map<String, Value>) -> Self {
        Self {
            table,
            fields,
            associations: HashMap::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The record's opaque id
    pub fn id(&self) -> GraphResult<Value> {
        self.fields.get("id").cloned().ok_or_else(|| {
            GraphError::Store(format!(
                "record in table '{}' has no 'id' field",
                self.table.name()
            ))
        })
    }

    /// The `table:id` key identifying this record across a graph
    pub fn qualified_id(&self) -> GraphResult<String> {
        Ok(qualified_id(self.table.name(), &self.id()?))
    }

    /// All association slots and their states
    pub fn associations(&self) -> &HashMap<String, AssociationSlot> {
        &self.associations
    }

    /// Whether the given association has been fetched
    pub fn is_fetched(&self, property: &str) -> bool {
        matches!(
            self.associations.get(property),
            Some(AssociationSlot::Fetched(_))
        )
    }

    /// Read a fetched association. An unfetched or absent slot fails:
    /// associations are never lazily loaded on access.
    pub fn association(&self, property: &str) -> GraphResult<AssociationValue> {
        match self.associations.get(property) {
            Some(AssociationSlot::Fetched(value)) => Ok(value.clone()),
            _ => Err(GraphError::Access(format!(
                "association '{}.{}' not fetched; add an explicit fetch request",
                self.table.name(),
                property
            ))),
        }
    }

    /// Mark a declared association as unfetched. Never demotes a slot
    /// that is already fetched.
    pub(crate) fn guard(&mut self, property: &str) {
        self.associations
            .entry(property.to_string())
            .or_insert(AssociationSlot::Unfetched);
    }

    /// Populate an association exactly once. The Unfetched -> Fetched
    /// transition is one-directional.
    pub(crate) fn fulfill(
        &mut self,
        property: &str,
        value: AssociationValue,
    ) -> GraphResult<()> {
        if self.is_fetched(property) {
            return Err(GraphError::Access(format!(
                "association '{}.{}' already fetched; slots never reset",
                self.table.name(),
                property
            )));
        }
        self.associations
            .insert(property.to_string(), AssociationSlot::Fetched(value));
        Ok(())
    }
}

// Field output only; association values are non-enumerable by design.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table.name())
            .field("fields", &self.fields)
            .field("associations", &self.associations)
            .finish()
    }
}

/// Shared handle to a record. Within one load or encode operation the
/// identity map guarantees at most one handle target per qualified id,
/// so identity comparison is pointer equality.
#[derive(Clone)]
pub struct SharedRecord(Arc<RwLock<Record>>);

impl SharedRecord {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Identity comparison: same in-memory instance, not equal copies
    pub fn ptr_eq(&self, other: &SharedRecord) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn table(&self) -> Table {
        self.read().table().clone()
    }

    pub fn id(&self) -> GraphResult<Value> {
        self.read().id()
    }

    pub fn qualified_id(&self) -> GraphResult<String> {
        self.read().qualified_id()
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.read().field(name).cloned()
    }

    pub fn is_fetched(&self, property: &str) -> bool {
        self.read().is_fetched(property)
    }

    pub fn association(&self, property: &str) -> GraphResult<AssociationValue> {
        self.read().association(property)
    }
}

impl Serialize for SharedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.read().serialize(serializer)
    }
}

impl fmt::Debug for SharedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(guard) => guard.fmt(f),
            Err(_) => f.write_str("SharedRecord(<locked>)"),
        }
    }
}
