//! Execution context threaded through every loader and store call
//!
//! The context is opaque to the core: it is carried for tracing and
//! scoping only, never inspected or branched on.

use uuid::Uuid;

/// Opaque per-operation context passed through all calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    trace_id: Uuid,
}

impl ExecutionContext {
    /// Create a context with a fresh trace id
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
        }
    }

    /// Create a context carrying an existing trace id (e.g. from an
    /// incoming remote call)
    pub fn with_trace_id(trace_id: Uuid) -> Self {
        Self { trace_id }
    }

    /// The trace id identifying the surrounding operation
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_round_trips() {
        let id = Uuid::new_v4();
        let cx = ExecutionContext::with_trace_id(id);
        assert_eq!(cx.trace_id(), id);
    }

    #[test]
    fn test_fresh_contexts_are_distinct() {
        assert_ne!(ExecutionContext::new(), ExecutionContext::new());
    }
}
