//! The [`GraphStore`] trait defining the storage contract for preference graphs.
//!
//! Two-layer API design:
//! - **Primitive** methods form the trait foundation: node creation, single
//!   edge create/delete, directional edge queries filtered by type, and flag
//!   get/set/clear. Each backend implements these.
//! - **Provided** methods (`single_edge_out`, `has_edge`, `edges`) are built
//!   on the primitives and shared by every backend.
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait, so the
//! connectivity engine is generic over them without changing core logic.

use delegraph_core::{Direction, Edge, EdgeId, EdgeType, Flag, NodeId, NodeKind, TopicId};

use crate::error::StorageError;

/// The storage contract for preference graphs.
///
/// The trait is synchronous (not async): every update in this system is a
/// single-threaded walk that must complete inside one transaction.
pub trait GraphStore {
    // -------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------

    /// Adds a node and returns its id. Ids are allocated densely from 0.
    fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, StorageError>;

    /// Returns the kind of an existing node.
    fn node_kind(&self, node: NodeId) -> Result<NodeKind, StorageError>;

    /// Lists every node id in ascending order.
    fn nodes(&self) -> Result<Vec<NodeId>, StorageError>;

    // -------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------

    /// Creates an edge between two existing nodes.
    ///
    /// `rank` is only meaningful for ranked edges.
    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        ty: EdgeType,
        rank: Option<i64>,
    ) -> Result<EdgeId, StorageError>;

    /// Deletes an edge.
    fn delete_edge(&mut self, id: EdgeId) -> Result<(), StorageError>;

    /// Looks up an edge by id, `None` if it no longer exists.
    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, StorageError>;

    /// Edges leaving `node` whose type is one of `types`, ordered by id.
    fn edges_out(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError>;

    /// Edges entering `node` whose type is one of `types`, ordered by id.
    fn edges_in(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError>;

    // -------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------

    fn has_flag(&self, node: NodeId, flag: Flag) -> Result<bool, StorageError>;

    /// Sets a flag. Setting an already-set flag is a no-op.
    fn set_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError>;

    /// Clears a flag. Clearing an unset flag is a no-op.
    fn clear_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------

    /// Every topic that appears on an edge or flag, ascending.
    fn topics(&self) -> Result<Vec<TopicId>, StorageError>;

    // -------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------

    /// Runs `f` atomically: its writes are kept if it returns `Ok` and
    /// discarded if it returns `Err`. Calls nest; an inner failure that the
    /// outer closure recovers from only discards the inner writes.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StorageError>;

    // -------------------------------------------------------------------
    // Provided queries
    // -------------------------------------------------------------------

    /// Edges at `node` in the given direction.
    fn edges(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[EdgeType],
    ) -> Result<Vec<Edge>, StorageError> {
        match direction {
            Direction::Outgoing => self.edges_out(node, types),
            Direction::Incoming => self.edges_in(node, types),
        }
    }

    /// The single outgoing edge of type `ty`, if any.
    ///
    /// Returns [`StorageError::IntegrityError`] if the store holds more than
    /// one.
    fn single_edge_out(&self, node: NodeId, ty: EdgeType) -> Result<Option<Edge>, StorageError> {
        let mut edges = self.edges_out(node, &[ty])?;
        if edges.len() > 1 {
            return Err(StorageError::IntegrityError {
                reason: format!("node {node} has {} outgoing {ty} edges", edges.len()),
            });
        }
        Ok(edges.pop())
    }

    /// Returns `true` if `node` has at least one edge of the given types in
    /// the given direction.
    fn has_edge(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[EdgeType],
    ) -> Result<bool, StorageError> {
        Ok(!self.edges(node, direction, types)?.is_empty())
    }
}
