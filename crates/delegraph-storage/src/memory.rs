//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests, ephemeral sessions,
//! and anywhere persistence isn't needed. Nodes and edges live in a petgraph
//! `StableGraph` arena with identical semantics to the SQLite backend.
//!
//! Transactions keep an undo journal of the writes made inside them, so the
//! cost of an update is proportional to what it wrote, not to the graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;

use delegraph_core::{Direction, Edge, EdgeId, EdgeType, Flag, NodeId, NodeKind, TopicId};

use crate::error::StorageError;
use crate::traits::GraphStore;

/// Node weight: the node's kind plus its set flags.
#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    flags: HashSet<Flag>,
}

/// Edge weight. The public id is kept alongside because petgraph recycles
/// vacant edge slots and `EdgeId`s must never be reused.
#[derive(Debug, Clone)]
struct EdgeRecord {
    id: EdgeId,
    ty: EdgeType,
    rank: Option<i64>,
}

/// The graph proper. Everything a transaction can roll back lives here.
#[derive(Debug, Clone)]
struct Arena {
    graph: StableGraph<NodeRecord, EdgeRecord, Directed, u32>,
    /// Public edge id to arena slot.
    edge_slots: HashMap<EdgeId, EdgeIndex<u32>>,
    /// Next edge id. Starts at 1 to line up with SQLite AUTOINCREMENT.
    next_edge_id: u32,
}

impl Arena {
    fn new() -> Self {
        Arena {
            graph: StableGraph::default(),
            edge_slots: HashMap::new(),
            next_edge_id: 1,
        }
    }
}

/// The inverse of one write made inside a transaction.
#[derive(Debug, Clone)]
enum Undo {
    AddNode(NodeId),
    CreateEdge(EdgeId),
    DeleteEdge {
        source: NodeId,
        target: NodeId,
        record: EdgeRecord,
    },
    SetFlag(NodeId, Flag),
    ClearFlag(NodeId, Flag),
}

/// In-memory implementation of [`GraphStore`].
///
/// Inside a transaction every write is journaled; a failed transaction
/// replays its part of the journal backwards.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    arena: Arena,
    journal: Vec<Undo>,
    /// Number of open transactions.
    depth: usize,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        InMemoryStore {
            arena: Arena::new(),
            journal: Vec::new(),
            depth: 0,
        }
    }

    fn record(&mut self, undo: Undo) {
        if self.depth > 0 {
            self.journal.push(undo);
        }
    }

    /// Undoes journaled writes until the journal is `mark` entries long.
    ///
    /// Nodes are undone newest first, so their arena slots free up in an
    /// order that hands the same ids out again.
    fn rewind(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            let graph = &mut self.arena.graph;
            match undo {
                Undo::AddNode(node) => {
                    graph.remove_node(NodeIndex::from(node));
                }
                Undo::CreateEdge(id) => {
                    if let Some(slot) = self.arena.edge_slots.remove(&id) {
                        graph.remove_edge(slot);
                    }
                }
                Undo::DeleteEdge {
                    source,
                    target,
                    record,
                } => {
                    let id = record.id;
                    let slot =
                        graph.add_edge(NodeIndex::from(source), NodeIndex::from(target), record);
                    self.arena.edge_slots.insert(id, slot);
                }
                Undo::SetFlag(node, flag) => {
                    if let Some(record) = graph.node_weight_mut(NodeIndex::from(node)) {
                        record.flags.remove(&flag);
                    }
                }
                Undo::ClearFlag(node, flag) => {
                    if let Some(record) = graph.node_weight_mut(NodeIndex::from(node)) {
                        record.flags.insert(flag);
                    }
                }
            }
        }
    }

    /// Returns the node record, or error if not found.
    fn node(&self, node: NodeId) -> Result<&NodeRecord, StorageError> {
        self.arena
            .graph
            .node_weight(NodeIndex::from(node))
            .ok_or(StorageError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeRecord, StorageError> {
        self.arena
            .graph
            .node_weight_mut(NodeIndex::from(node))
            .ok_or(StorageError::NodeNotFound(node))
    }

    /// Collects edges at `node` in one direction, filtered and ordered by id.
    fn collect_edges(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[EdgeType],
    ) -> Result<Vec<Edge>, StorageError> {
        self.node(node)?;
        let mut edges: Vec<Edge> = self
            .arena
            .graph
            .edges_directed(NodeIndex::from(node), direction)
            .filter(|e| types.contains(&e.weight().ty))
            .map(|e| Edge {
                id: e.weight().id,
                source: NodeId::from(e.source()),
                target: NodeId::from(e.target()),
                ty: e.weight().ty,
                rank: e.weight().rank,
            })
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for InMemoryStore {
    fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, StorageError> {
        let idx = self.arena.graph.add_node(NodeRecord {
            kind,
            flags: HashSet::new(),
        });
        let node = NodeId::from(idx);
        self.record(Undo::AddNode(node));
        Ok(node)
    }

    fn node_kind(&self, node: NodeId) -> Result<NodeKind, StorageError> {
        Ok(self.node(node)?.kind)
    }

    fn nodes(&self) -> Result<Vec<NodeId>, StorageError> {
        let mut ids: Vec<NodeId> = self.arena.graph.node_indices().map(NodeId::from).collect();
        ids.sort();
        Ok(ids)
    }

    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        ty: EdgeType,
        rank: Option<i64>,
    ) -> Result<EdgeId, StorageError> {
        self.node(source)?;
        self.node(target)?;

        let id = EdgeId(self.arena.next_edge_id);
        self.arena.next_edge_id += 1;

        let slot = self.arena.graph.add_edge(
            NodeIndex::from(source),
            NodeIndex::from(target),
            EdgeRecord { id, ty, rank },
        );
        self.arena.edge_slots.insert(id, slot);
        self.record(Undo::CreateEdge(id));
        Ok(id)
    }

    fn delete_edge(&mut self, id: EdgeId) -> Result<(), StorageError> {
        let slot = self
            .arena
            .edge_slots
            .remove(&id)
            .ok_or(StorageError::EdgeNotFound(id))?;
        let (source, target) = self
            .arena
            .graph
            .edge_endpoints(slot)
            .ok_or(StorageError::EdgeNotFound(id))?;
        let record = self
            .arena
            .graph
            .remove_edge(slot)
            .ok_or(StorageError::EdgeNotFound(id))?;
        self.record(Undo::DeleteEdge {
            source: NodeId::from(source),
            target: NodeId::from(target),
            record,
        });
        Ok(())
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, StorageError> {
        let Some(&slot) = self.arena.edge_slots.get(&id) else {
            return Ok(None);
        };
        let graph = &self.arena.graph;
        let edge = graph
            .edge_endpoints(slot)
            .zip(graph.edge_weight(slot))
            .map(|((source, target), record)| Edge {
                id: record.id,
                source: NodeId::from(source),
                target: NodeId::from(target),
                ty: record.ty,
                rank: record.rank,
            });
        Ok(edge)
    }

    fn edges_out(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError> {
        self.collect_edges(node, Direction::Outgoing, types)
    }

    fn edges_in(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError> {
        self.collect_edges(node, Direction::Incoming, types)
    }

    fn has_flag(&self, node: NodeId, flag: Flag) -> Result<bool, StorageError> {
        Ok(self.node(node)?.flags.contains(&flag))
    }

    fn set_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError> {
        if self.node_mut(node)?.flags.insert(flag) {
            self.record(Undo::SetFlag(node, flag));
        }
        Ok(())
    }

    fn clear_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError> {
        if self.node_mut(node)?.flags.remove(&flag) {
            self.record(Undo::ClearFlag(node, flag));
        }
        Ok(())
    }

    fn topics(&self) -> Result<Vec<TopicId>, StorageError> {
        let graph = &self.arena.graph;
        let from_edges = graph
            .edge_indices()
            .filter_map(|idx| graph.edge_weight(idx))
            .filter_map(|record| record.ty.topic());
        let from_flags = graph
            .node_indices()
            .filter_map(|idx| graph.node_weight(idx))
            .flat_map(|record| record.flags.iter().map(Flag::topic));
        let topics: BTreeSet<TopicId> = from_edges.chain(from_flags).collect();
        Ok(topics.into_iter().collect())
    }

    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mark = self.journal.len();
        let next_edge_id = self.arena.next_edge_id;

        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        if result.is_err() {
            tracing::debug!(
                undone = self.journal.len() - mark,
                "rolling back in-memory transaction"
            );
            self.rewind(mark);
            self.arena.next_edge_id = next_edge_id;
        }
        if self.depth == 0 {
            self.journal.clear();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TopicId = TopicId(1);

    fn three_nodes(store: &mut InMemoryStore) -> (NodeId, NodeId, NodeId) {
        let a = store.add_node(NodeKind::Participant).unwrap();
        let b = store.add_node(NodeKind::Participant).unwrap();
        let c = store.add_node(NodeKind::Content).unwrap();
        (a, b, c)
    }

    #[test]
    fn node_ids_are_dense_from_zero() {
        let mut store = InMemoryStore::new();
        let (a, b, c) = three_nodes(&mut store);
        assert_eq!((a, b, c), (NodeId(0), NodeId(1), NodeId(2)));
        assert_eq!(store.nodes().unwrap(), vec![a, b, c]);
        assert_eq!(store.node_kind(c).unwrap(), NodeKind::Content);
    }

    #[test]
    fn edge_ids_are_never_reused() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);

        let first = store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();
        store.delete_edge(first).unwrap();
        let second = store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();

        assert_eq!(first, EdgeId(1));
        assert_eq!(second, EdgeId(2));
        assert!(store.edge(first).unwrap().is_none());
        assert_eq!(store.edge(second).unwrap().unwrap().target, b);
    }

    #[test]
    fn edge_queries_filter_by_type_and_direction() {
        let mut store = InMemoryStore::new();
        let (a, b, c) = three_nodes(&mut store);
        store.create_edge(a, b, EdgeType::Ranked, Some(1)).unwrap();
        store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();
        store.create_edge(a, c, EdgeType::Anchored(T), None).unwrap();

        let out = store.edges_out(a, &[EdgeType::Ranked, EdgeType::Manual(T)]).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].id < out[1].id);

        let into_b = store.edges_in(b, &[EdgeType::Manual(T)]).unwrap();
        assert_eq!(into_b.len(), 1);
        assert_eq!(into_b[0].source, a);

        assert!(store.edges_out(a, &[EdgeType::Manual(TopicId(2))]).unwrap().is_empty());
        assert!(store
            .has_edge(c, Direction::Incoming, &[EdgeType::Anchored(T)])
            .unwrap());
    }

    #[test]
    fn single_edge_out_reports_duplicates() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);
        store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();
        assert!(store.single_edge_out(a, EdgeType::Manual(T)).unwrap().is_some());

        store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();
        let err = store.single_edge_out(a, EdgeType::Manual(T)).unwrap_err();
        assert!(matches!(err, StorageError::IntegrityError { .. }));
    }

    #[test]
    fn missing_nodes_and_edges_are_errors() {
        let mut store = InMemoryStore::new();
        let a = store.add_node(NodeKind::Participant).unwrap();
        assert!(matches!(
            store.create_edge(a, NodeId(9), EdgeType::Ranked, Some(1)),
            Err(StorageError::NodeNotFound(NodeId(9)))
        ));
        assert!(matches!(
            store.delete_edge(EdgeId(4)),
            Err(StorageError::EdgeNotFound(EdgeId(4)))
        ));
    }

    #[test]
    fn flags_are_per_topic() {
        let mut store = InMemoryStore::new();
        let (a, _, _) = three_nodes(&mut store);
        store.set_flag(a, Flag::Disjoint(T)).unwrap();
        assert!(store.has_flag(a, Flag::Disjoint(T)).unwrap());
        assert!(!store.has_flag(a, Flag::Disjoint(TopicId(2))).unwrap());

        store.clear_flag(a, Flag::Disjoint(T)).unwrap();
        store.clear_flag(a, Flag::Disjoint(T)).unwrap();
        assert!(!store.has_flag(a, Flag::Disjoint(T)).unwrap());
    }

    #[test]
    fn topics_collects_edges_and_flags() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);
        store.create_edge(a, b, EdgeType::Ranked, Some(1)).unwrap();
        store.create_edge(a, b, EdgeType::Manual(TopicId(5)), None).unwrap();
        store.set_flag(b, Flag::Disjoint(TopicId(2))).unwrap();
        assert_eq!(store.topics().unwrap(), vec![TopicId(2), TopicId(5)]);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);

        let result: Result<(), StorageError> = store.transaction(|s| {
            s.create_edge(a, b, EdgeType::Manual(T), None)?;
            s.set_flag(a, Flag::Disjoint(T))?;
            Err(StorageError::IntegrityError {
                reason: "boom".into(),
            })
        });
        assert!(result.is_err());
        assert!(store.edges_out(a, &[EdgeType::Manual(T)]).unwrap().is_empty());
        assert!(!store.has_flag(a, Flag::Disjoint(T)).unwrap());

        // The id counter is restored too.
        let id = store.create_edge(a, b, EdgeType::Manual(T), None).unwrap();
        assert_eq!(id, EdgeId(1));
    }

    #[test]
    fn nested_failure_only_discards_inner_writes() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);

        let outer: Result<(), StorageError> = store.transaction(|s| {
            s.create_edge(a, b, EdgeType::Ranked, Some(1))?;
            let inner: Result<(), StorageError> = s.transaction(|s| {
                s.create_edge(a, b, EdgeType::Manual(T), None)?;
                Err(StorageError::EdgeNotFound(EdgeId(0)))
            });
            assert!(inner.is_err());
            Ok(())
        });
        assert!(outer.is_ok());
        assert_eq!(store.edges_out(a, &[EdgeType::Ranked]).unwrap().len(), 1);
        assert!(store.edges_out(a, &[EdgeType::Manual(T)]).unwrap().is_empty());
    }

    #[test]
    fn rollback_restores_deleted_edges_cleared_flags_and_node_ids() {
        let mut store = InMemoryStore::new();
        let (a, b, c) = three_nodes(&mut store);
        let ranked = store.create_edge(a, b, EdgeType::Ranked, Some(2)).unwrap();
        store.create_edge(b, c, EdgeType::Anchored(T), None).unwrap();
        store.set_flag(a, Flag::Disjoint(T)).unwrap();
        let before_out = store.edges_out(a, &[EdgeType::Ranked]).unwrap();

        let result: Result<(), StorageError> = store.transaction(|s| {
            s.delete_edge(ranked)?;
            s.clear_flag(a, Flag::Disjoint(T))?;
            let d = s.add_node(NodeKind::Participant)?;
            let e = s.add_node(NodeKind::Content)?;
            s.create_edge(d, e, EdgeType::Anchored(T), None)?;
            Err(StorageError::EdgeNotFound(EdgeId(99)))
        });
        assert!(result.is_err());

        assert_eq!(store.edges_out(a, &[EdgeType::Ranked]).unwrap(), before_out);
        assert_eq!(store.edge(ranked).unwrap().map(|e| e.rank), Some(Some(2)));
        assert!(store.has_flag(a, Flag::Disjoint(T)).unwrap());
        assert_eq!(store.nodes().unwrap(), vec![a, b, c]);
        assert_eq!(store.add_node(NodeKind::Participant).unwrap(), NodeId(3));
        assert_eq!(store.add_node(NodeKind::Participant).unwrap(), NodeId(4));
    }

    #[test]
    fn committed_transactions_leave_no_journal() {
        let mut store = InMemoryStore::new();
        let (a, b, _) = three_nodes(&mut store);
        let result: Result<(), StorageError> = store.transaction(|s| {
            s.create_edge(a, b, EdgeType::Ranked, Some(1))?;
            s.transaction(|s| s.set_flag(b, Flag::Disjoint(T)))
        });
        assert!(result.is_ok());
        assert!(store.journal.is_empty());
        assert_eq!(store.depth, 0);

        // Writes outside any transaction are not journaled at all.
        store.set_flag(a, Flag::Disjoint(T)).unwrap();
        assert!(store.journal.is_empty());
    }
}
