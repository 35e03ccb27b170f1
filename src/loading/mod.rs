//! Graph loading: breadth-first association expansion with identity-map
//! deduplication

pub mod graph_loader;
pub mod identity;

pub use graph_loader::*;
pub use identity::*;
