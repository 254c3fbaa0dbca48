//! Typed, topic-bound view of a [`GraphStore`].
//!
//! Every engine component reads and writes the graph through a
//! [`Navigator`], which pins the topic so callers never assemble edge types
//! by hand. Reads take `&S`, writes take `&mut S`; the navigator itself holds
//! no state beyond its topic.

use std::collections::HashSet;

use delegraph_core::{Direction, Edge, EdgeType, Flag, NodeId, TopicId};
use delegraph_storage::GraphStore;

use crate::error::EngineError;
use crate::resolve::Resolution;

/// A topic-scoped accessor over the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    topic: TopicId,
}

impl Navigator {
    pub fn new(topic: TopicId) -> Self {
        Navigator { topic }
    }

    pub fn topic(&self) -> TopicId {
        self.topic
    }

    pub fn manual(&self) -> EdgeType {
        EdgeType::Manual(self.topic)
    }

    pub fn provisional(&self) -> EdgeType {
        EdgeType::Provisional(self.topic)
    }

    pub fn anchored(&self) -> EdgeType {
        EdgeType::Anchored(self.topic)
    }

    pub fn once_anchored(&self) -> EdgeType {
        EdgeType::OnceAnchored(self.topic)
    }

    pub fn connected(&self) -> EdgeType {
        EdgeType::Connected(self.topic)
    }

    pub fn disjoint(&self) -> Flag {
        Flag::Disjoint(self.topic)
    }

    /// Both targeted edge types.
    pub fn targeted(&self) -> [EdgeType; 2] {
        [self.manual(), self.provisional()]
    }

    /// The edge types walked when looking for upstream dependents.
    pub fn upstream(&self) -> [EdgeType; 3] {
        [self.manual(), EdgeType::Ranked, self.provisional()]
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn manual_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Edge>, EngineError> {
        Ok(store.single_edge_out(node, self.manual())?)
    }

    pub fn provisional_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Edge>, EngineError> {
        Ok(store.single_edge_out(node, self.provisional())?)
    }

    /// The node's single targeted-outgoing edge, MANUAL or PROVISIONAL.
    ///
    /// Fails with [`EngineError::Integrity`] if the node has both.
    pub fn targeted_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Edge>, EngineError> {
        let mut edges = store.edges_out(node, &self.targeted())?;
        if edges.len() > 1 {
            return Err(EngineError::integrity(format!(
                "node {node} has {} targeted edges on topic {}",
                edges.len(),
                self.topic
            )));
        }
        Ok(edges.pop())
    }

    pub fn anchored_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Edge>, EngineError> {
        Ok(store.single_edge_out(node, self.anchored())?)
    }

    pub fn is_anchored<S: GraphStore>(&self, store: &S, node: NodeId) -> Result<bool, EngineError> {
        Ok(store.has_edge(node, Direction::Outgoing, &[self.anchored()])?)
    }

    pub fn connected_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Edge>, EngineError> {
        Ok(store.single_edge_out(node, self.connected())?)
    }

    pub fn is_disjoint<S: GraphStore>(&self, store: &S, node: NodeId) -> Result<bool, EngineError> {
        Ok(store.has_flag(node, self.disjoint())?)
    }

    /// The cached resolution of `node`: its CONNECTED target, its disjoint
    /// flag, or itself if it is an anchor with neither. `None` when nothing
    /// is cached.
    ///
    /// Cache entries win over the anchor check so that a freshly anchored
    /// node still reports the stale value it must be compared against.
    pub fn cached<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Resolution>, EngineError> {
        if let Some(edge) = self.connected_out(store, node)? {
            return Ok(Some(Resolution::Connected(edge.target)));
        }
        if self.is_disjoint(store, node)? {
            return Ok(Some(Resolution::Disjoint));
        }
        if self.is_anchored(store, node)? {
            return Ok(Some(Resolution::Connected(node)));
        }
        Ok(None)
    }

    /// RANKED edges of `node`, ascending by `(rank, edge id)`.
    pub fn ranked_out<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Vec<Edge>, EngineError> {
        let mut edges = store.edges_out(node, &[EdgeType::Ranked])?;
        edges.sort_by(Edge::rank_order);
        Ok(edges)
    }

    /// Candidates tried by a walk, in priority order: the targeted edge if
    /// there is one, otherwise every RANKED edge.
    pub fn walkable_candidates<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Vec<Edge>, EngineError> {
        match self.targeted_out(store, node)? {
            Some(edge) => Ok(vec![edge]),
            None => self.ranked_out(store, node),
        }
    }

    /// MANUAL, RANKED and PROVISIONAL edges into `node`.
    pub fn incoming<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Vec<Edge>, EngineError> {
        Ok(store.edges_in(node, &self.upstream())?)
    }

    /// MANUAL and PROVISIONAL edges into `node`.
    pub fn targeted_incoming<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<Vec<Edge>, EngineError> {
        Ok(store.edges_in(node, &self.targeted())?)
    }

    /// Live connectivity: the node is anchored, or holds a PROVISIONAL edge,
    /// or its MANUAL chain reaches such a node.
    ///
    /// Does not consult the CONNECTED cache. A MANUAL chain that loops back
    /// on itself is not connected.
    pub fn is_connected<S: GraphStore>(
        &self,
        store: &S,
        node: NodeId,
    ) -> Result<bool, EngineError> {
        let mut visited = HashSet::new();
        let mut current = node;
        loop {
            if !visited.insert(current) {
                return Ok(false);
            }
            if self.is_anchored(store, current)? {
                return Ok(true);
            }
            if self.provisional_out(store, current)?.is_some() {
                return Ok(true);
            }
            match self.manual_out(store, current)? {
                Some(edge) => current = edge.target,
                None => return Ok(false),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cache writes
    // -----------------------------------------------------------------------

    /// Removes the node's CONNECTED edge and disjoint flag.
    pub fn clear_connection_state<S: GraphStore>(
        &self,
        store: &mut S,
        node: NodeId,
    ) -> Result<(), EngineError> {
        for edge in store.edges_out(node, &[self.connected()])? {
            store.delete_edge(edge.id)?;
        }
        store.clear_flag(node, self.disjoint())?;
        Ok(())
    }

    /// Caches `node` as connected to `anchor`, replacing any previous state.
    pub fn write_connected<S: GraphStore>(
        &self,
        store: &mut S,
        node: NodeId,
        anchor: NodeId,
    ) -> Result<(), EngineError> {
        if self.connected_out(store, node)?.map(|e| e.target) == Some(anchor)
            && !self.is_disjoint(store, node)?
        {
            return Ok(());
        }
        self.clear_connection_state(store, node)?;
        store.create_edge(node, anchor, self.connected(), None)?;
        Ok(())
    }

    /// Caches `node` as disjoint, replacing any previous state.
    pub fn write_disjoint<S: GraphStore>(
        &self,
        store: &mut S,
        node: NodeId,
    ) -> Result<(), EngineError> {
        self.clear_connection_state(store, node)?;
        store.set_flag(node, self.disjoint())?;
        Ok(())
    }
}
