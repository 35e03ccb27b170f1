//! Association system: declared relationship metadata and its registry

pub mod metadata;
pub mod registry;

pub use metadata::*;
pub use registry::*;
