//! Engine error types.
//!
//! Cycles are not errors: they are detected, cached as disjoint, and broken
//! where the model requires it. What remains are storage failures, violated
//! store invariants, and caller mistakes.

use delegraph_storage::StorageError;
use thiserror::Error;

/// Errors produced by the connectivity engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The store holds a state the model forbids, e.g. a node with both a
    /// MANUAL and a PROVISIONAL edge on one topic.
    #[error("store invariant violated: {reason}")]
    Integrity { reason: String },

    /// The caller asked for something the current state cannot provide.
    #[error("precondition violated: {reason}")]
    Precondition { reason: String },
}

impl EngineError {
    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        EngineError::Precondition {
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        EngineError::Integrity {
            reason: reason.into(),
        }
    }
}
