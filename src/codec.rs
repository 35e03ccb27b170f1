//! Graph codec: flat, reference-based wire envelope
//!
//! Encoding flattens a loaded graph into an identity map of records whose
//! association values are replaced by qualified-id references, plus a
//! root reference. Decoding rebuilds the linked graph through a decode
//! cache: a record is registered *before* its references are resolved, so
//! two paths reaching the same qualified id share one instance and true
//! cycles terminate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};
use crate::loading::identity::IdentityMap;
use crate::record::{AssociationSlot, AssociationValue, Record, SharedRecord, Table};

/// Reserved key carrying the reference-only association side table
/// inside an encoded record
pub const ASSOCIATIONS_KEY: &str = "associations";

/// A loaded result: one record or a list of records
#[derive(Debug, Clone)]
pub enum GraphValue {
    One(SharedRecord),
    Many(Vec<SharedRecord>),
}

impl GraphValue {
    /// The single record of a one-valued result
    pub fn one(&self) -> GraphResult<SharedRecord> {
        match self {
            GraphValue::One(record) => Ok(record.clone()),
            GraphValue::Many(_) => Err(GraphError::Cardinality(
                "expected a single-record result, got a collection".to_string(),
            )),
        }
    }

    /// The record list of a many-valued result
    pub fn many(&self) -> GraphResult<Vec<SharedRecord>> {
        match self {
            GraphValue::Many(records) => Ok(records.clone()),
            GraphValue::One(_) => Err(GraphError::Cardinality(
                "expected a record-list result, got a single record".to_string(),
            )),
        }
    }
}

/// A decoded payload: a linked graph or a plain value
#[derive(Debug, Clone)]
pub enum Decoded {
    Graph(GraphValue),
    Plain(Value),
}

/// The transmissible form of a loaded graph. Without an identity map the
/// payload is a plain value carrying no attached graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(
        rename = "identityMap",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub identity_map: Option<HashMap<String, Map<String, Value>>>,
    pub value: Value,
}

/// Encodes loaded graphs into envelopes and decodes them back
pub struct GraphCodec;

impl GraphCodec {
    /// Flatten a loaded result and the identity map of every record it
    /// reached into a reference-based envelope.
    pub fn encode(value: &GraphValue, identity: &IdentityMap) -> GraphResult<Envelope> {
        let mut identity_map = HashMap::with_capacity(identity.len());
        for (qualified_id, record) in identity.iter() {
            identity_map.insert(qualified_id.clone(), Self::encode_record(record)?);
        }

        let root = match value {
            GraphValue::One(record) => Value::String(record.qualified_id()?),
            GraphValue::Many(records) => Value::Array(
                records
                    .iter()
                    .map(|record| record.qualified_id().map(Value::String))
                    .collect::<GraphResult<Vec<_>>>()?,
            ),
        };

        tracing::debug!(records = identity_map.len(), "encoded graph envelope");
        Ok(Envelope {
            identity_map: Some(identity_map),
            value: root,
        })
    }

    /// Wrap a value that carries no attached graph
    pub fn plain(value: Value) -> Envelope {
        Envelope {
            identity_map: None,
            value,
        }
    }

    /// Rebuild the linked graph (or pass a plain value through)
    pub fn decode(envelope: &Envelope) -> GraphResult<Decoded> {
        let Some(identity_map) = &envelope.identity_map else {
            return Ok(Decoded::Plain(envelope.value.clone()));
        };

        let mut cache: HashMap<String, SharedRecord> = HashMap::new();
        let value = match &envelope.value {
            Value::Array(references) => {
                let mut records = Vec::with_capacity(references.len());
                for reference in references {
                    records.push(Self::decode_reference(
                        Self::as_qualified_id(reference)?,
                        identity_map,
                        &mut cache,
                    )?);
                }
                GraphValue::Many(records)
            }
            other => GraphValue::One(Self::decode_reference(
                Self::as_qualified_id(other)?,
                identity_map,
                &mut cache,
            )?),
        };
        Ok(Decoded::Graph(value))
    }

    fn encode_record(record: &SharedRecord) -> GraphResult<Map<String, Value>> {
        let guard = record.read();
        let mut encoded = guard.fields().clone();

        let mut side_table = Map::new();
        for (property, slot) in guard.associations() {
            let AssociationSlot::Fetched(value) = slot else {
                continue;
            };
            let reference = match value {
                AssociationValue::One(related) => Value::String(related.qualified_id()?),
                AssociationValue::Many(related) => Value::Array(
                    related
                        .iter()
                        .map(|record| record.qualified_id().map(Value::String))
                        .collect::<GraphResult<Vec<_>>>()?,
                ),
            };
            side_table.insert(property.clone(), reference);
        }
        if !side_table.is_empty() {
            encoded.insert(ASSOCIATIONS_KEY.to_string(), Value::Object(side_table));
        }
        Ok(encoded)
    }

    fn decode_reference(
        qualified_id: &str,
        identity_map: &HashMap<String, Map<String, Value>>,
        cache: &mut HashMap<String, SharedRecord>,
    ) -> GraphResult<SharedRecord> {
        if let Some(existing) = cache.get(qualified_id) {
            return Ok(existing.clone());
        }

        let encoded = identity_map.get(qualified_id).ok_or_else(|| {
            GraphError::Identity(format!(
                "qualified id '{}' missing from identity map",
                qualified_id
            ))
        })?;
        let (table_name, _) = qualified_id.split_once(':').ok_or_else(|| {
            GraphError::Identity(format!(
                "malformed qualified id '{}', expected 'table:id'",
                qualified_id
            ))
        })?;

        let mut fields = encoded.clone();
        let side_table = match fields.remove(ASSOCIATIONS_KEY) {
            Some(Value::Object(side_table)) => Some(side_table),
            Some(other) => {
                return Err(GraphError::Identity(format!(
                    "'{}' side table of '{}' is not an object: {}",
                    ASSOCIATIONS_KEY, qualified_id, other
                )))
            }
            None => None,
        };

        let record = SharedRecord::new(Record::new(Table::new(table_name), fields));
        // Register before resolving references: a cycle reaching back to
        // this qualified id must find this same instance in the cache.
        cache.insert(qualified_id.to_string(), record.clone());

        if let Some(side_table) = side_table {
            for (property, reference) in side_table {
                let value = match reference {
                    Value::Array(references) => {
                        let mut related = Vec::with_capacity(references.len());
                        for reference in &references {
                            related.push(Self::decode_reference(
                                Self::as_qualified_id(reference)?,
                                identity_map,
                                cache,
                            )?);
                        }
                        AssociationValue::Many(related)
                    }
                    other => AssociationValue::One(Self::decode_reference(
                        Self::as_qualified_id(&other)?,
                        identity_map,
                        cache,
                    )?),
                };
                record.write().fulfill(&property, value)?;
            }
        }
        Ok(record)
    }

    fn as_qualified_id(value: &Value) -> GraphResult<&str> {
        value.as_str().ok_or_else(|| {
            GraphError::Identity(format!(
                "expected a qualified-id reference, got {}",
                value
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_envelope_round_trip() {
        let envelope = GraphCodec::plain(json!({ "count": 3 }));
        let serialized = serde_json::to_string(&envelope).unwrap();
        assert!(!serialized.contains("identityMap"));

        let parsed: Envelope = serde_json::from_str(&serialized).unwrap();
        match GraphCodec::decode(&parsed).unwrap() {
            Decoded::Plain(value) => assert_eq!(value, json!({ "count": 3 })),
            Decoded::Graph(_) => panic!("plain payload decoded as graph"),
        }
    }

    #[test]
    fn test_decode_missing_reference_is_identity_error() {
        let mut identity_map = HashMap::new();
        let mut order = Map::new();
        order.insert("id".to_string(), json!("1"));
        order.insert(
            ASSOCIATIONS_KEY.to_string(),
            json!({ "items": ["OrderItem:404"] }),
        );
        identity_map.insert("Order:1".to_string(), order);

        let envelope = Envelope {
            identity_map: Some(identity_map),
            value: json!("Order:1"),
        };
        let err = GraphCodec::decode(&envelope).unwrap_err();
        assert!(matches!(err, GraphError::Identity(_)));
        assert!(err.to_string().contains("OrderItem:404"));
    }

    #[test]
    fn test_decode_relinks_shared_references() {
        // Two items both referencing the same order; the order lists both.
        let mut identity_map = HashMap::new();
        let mut order = Map::new();
        order.insert("id".to_string(), json!("1"));
        order.insert(
            ASSOCIATIONS_KEY.to_string(),
            json!({ "items": ["OrderItem:a", "OrderItem:b"] }),
        );
        identity_map.insert("Order:1".to_string(), order);
        for item_id in ["a", "b"] {
            let mut item = Map::new();
            item.insert("id".to_string(), json!(item_id));
            item.insert("orderId".to_string(), json!("1"));
            item.insert(ASSOCIATIONS_KEY.to_string(), json!({ "order": "Order:1" }));
            identity_map.insert(format!("OrderItem:{}", item_id), item);
        }

        let envelope = Envelope {
            identity_map: Some(identity_map),
            value: json!("Order:1"),
        };
        let Decoded::Graph(value) = GraphCodec::decode(&envelope).unwrap() else {
            panic!("graph payload decoded as plain value");
        };

        let order = value.one().unwrap();
        let items = order.association("items").unwrap().many().unwrap();
        assert_eq!(items.len(), 2);
        // Both back references resolve to the identical outer order.
        for item in &items {
            let back = item.association("order").unwrap().one().unwrap();
            assert!(back.ptr_eq(&order));
        }
        // Side-table key is consumed, not left in the fields.
        assert!(order.field(ASSOCIATIONS_KEY).is_none());
    }

    #[test]
    fn test_decode_self_cycle_terminates() {
        let mut identity_map = HashMap::new();
        let mut node = Map::new();
        node.insert("id".to_string(), json!("n1"));
        node.insert(ASSOCIATIONS_KEY.to_string(), json!({ "parent": "Node:n1" }));
        identity_map.insert("Node:n1".to_string(), node);

        let envelope = Envelope {
            identity_map: Some(identity_map),
            value: json!("Node:n1"),
        };
        let Decoded::Graph(value) = GraphCodec::decode(&envelope).unwrap() else {
            panic!("graph payload decoded as plain value");
        };
        let node = value.one().unwrap();
        let parent = node.association("parent").unwrap().one().unwrap();
        assert!(parent.ptr_eq(&node));
    }

    #[test]
    fn test_malformed_reference_rejected() {
        let envelope = Envelope {
            identity_map: Some(HashMap::new()),
            value: json!(42),
        };
        let err = GraphCodec::decode(&envelope).unwrap_err();
        assert!(matches!(err, GraphError::Identity(_)));
    }
}
