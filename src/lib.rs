//! # fetchgraph: Association Loading and Graph Serialization
//!
//! Association-aware data loader and identity-preserving graph codec.
//! Relationships between records are declared up front, fetched through
//! explicit fetch plans (never lazily on property access), expanded
//! breadth-first with identity-map deduplication, and serialized across
//! process boundaries as a flat, reference-based envelope that survives
//! shared nodes and cycles.
//!
//! The backing store, transport, and execution-context propagation are
//! external collaborators; this crate only consumes their operations.

pub mod associations;
pub mod codec;
pub mod context;
pub mod error;
pub mod loading;
pub mod ops;
pub mod plan;
pub mod record;
pub mod service;
pub mod store;


// Re-export core traits and types
pub use associations::*;
pub use codec::*;
pub use context::*;
pub use error::*;
pub use loading::*;
pub use ops::*;
pub use plan::*;
pub use record::*;
pub use service::*;
pub use store::*;
