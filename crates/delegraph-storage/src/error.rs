//! Storage error types for delegraph-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage layer:
//! backend failures, entity-not-found variants, integrity violations, and
//! stored labels that no longer map onto the data model.

use delegraph_core::{CoreError, EdgeId, NodeId};
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite backend reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// An edge was not found.
    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// A data integrity violation was detected, e.g. more than one edge
    /// where the model allows at most one.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// A stored row could not be mapped back onto the data model.
    #[error("corrupt row: {0}")]
    Core(#[from] CoreError),
}
