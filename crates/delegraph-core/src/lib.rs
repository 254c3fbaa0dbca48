//! Core data model for delegraph preference graphs.
//!
//! Participants delegate, per topic, to a chosen next hop until the chain
//! reaches an anchor that carries content directly. This crate holds the
//! shared vocabulary: stable ids, the typed edge model, node kinds and
//! per-topic flags. Storage and the connectivity engine live in
//! `delegraph-storage` and `delegraph-engine`.

pub mod edge;
pub mod error;
pub mod id;
pub mod node;

// Re-export commonly used types
pub use edge::{Direction, Edge, EdgeKind, EdgeType};
pub use error::CoreError;
pub use id::{EdgeId, NodeId, TopicId};
pub use node::{Flag, NodeKind};
