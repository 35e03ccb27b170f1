//! Error types for association loading and graph serialization
//!
//! All failures are immediate and non-retried: a loader or codec error
//! aborts the whole operation. Backing-store failures propagate through
//! the `Store` variant unmodified.

use std::fmt;

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Error types for loader and codec operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Relationship not declared for the given table/property
    Declaration(String),
    /// Read of an association that was never explicitly fetched
    Access(String),
    /// A to-one resolution or a get found 0 or more than 1 matches
    Cardinality(String),
    /// Decode referenced a qualified id absent from the identity map
    Identity(String),
    /// Backing-store failure, propagated as-is
    Store(String),
    /// Transport collaborator failure (unregistered operation, bad payload)
    Transport(String),
    /// Serialization/deserialization error
    Serialization(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Declaration(msg) => write!(f, "Declaration error: {}", msg),
            GraphError::Access(msg) => write!(f, "Access error: {}", msg),
            GraphError::Cardinality(msg) => write!(f, "Cardinality error: {}", msg),
            GraphError::Identity(msg) => write!(f, "Identity error: {}", msg),
            GraphError::Store(msg) => write!(f, "Store error: {}", msg),
            GraphError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GraphError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {}

// Convert from serde_json errors
impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}
