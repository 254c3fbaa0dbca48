//! Target assignment and cycle resolution.
//!
//! A node's per-topic *selection* is one of: anchored content, an explicit
//! MANUAL target, or nothing (in which case the engine maintains a
//! PROVISIONAL edge to its first connected RANKED candidate). Changing a
//! selection can change whether the node is connected, which in turn can
//! change what its upstream neighbors should provisionally point at. This
//! module performs that edge maintenance; cache repair is left to the
//! invalidation strategies.
//!
//! # Cascades
//!
//! Gains and losses of connectivity spread upstream through an explicit LIFO
//! worklist of [`Cascade`] items. Items are snapshots taken when pushed, so
//! each is re-validated when popped: the edge must still exist unchanged and
//! its target must still have gained (or lost) connectivity. Stale items are
//! dropped.
//!
//! # Cycles
//!
//! Whenever a node's targeted edge is (re)written, the targeted chain from it
//! is traced. If it returns to the node, every PROVISIONAL edge on the cycle
//! is deleted and every targeted edge entering the cycle from outside loses
//! connectivity. Cycles made only of MANUAL edges are left in place.

use std::collections::HashSet;

use indexmap::IndexSet;

use delegraph_core::{Edge, EdgeType, NodeId, NodeKind};
use delegraph_storage::GraphStore;

use crate::error::EngineError;
use crate::navigator::Navigator;

/// A node's requested per-topic selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Point a MANUAL edge at this participant.
    Target(NodeId),
    /// Anchor on this content node.
    Content(NodeId),
    /// Drop the current selection and fall back to ranked candidates.
    Clear,
}

/// A pending step of a connectivity cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cascade {
    /// The edge's target became connected.
    Gained(Edge),
    /// The edge's target stopped being connected.
    Lost(Edge),
    /// The node's targeted edge changed; look for a cycle through it.
    CycleCheck(NodeId),
}

// ---------------------------------------------------------------------------
// Live queries
// ---------------------------------------------------------------------------

/// The first RANKED candidate of `node`, by ascending rank, that is
/// currently connected.
pub fn provisional_target<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    node: NodeId,
) -> Result<Option<NodeId>, EngineError> {
    for edge in nav.ranked_out(store, node)? {
        if edge.target != node && nav.is_connected(store, edge.target)? {
            return Ok(Some(edge.target));
        }
    }
    Ok(None)
}

/// The nodes on the targeted chain from `start`, in chain order, if that
/// chain returns to `start`. Empty otherwise, including when the chain ends
/// in a cycle that does not contain `start`.
pub fn cycle<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    start: NodeId,
) -> Result<Vec<NodeId>, EngineError> {
    let mut chain = IndexSet::new();
    let mut current = start;
    loop {
        chain.insert(current);
        let Some(edge) = nav.targeted_out(store, current)? else {
            return Ok(Vec::new());
        };
        if edge.target == start {
            return Ok(chain.into_iter().collect());
        }
        if chain.contains(&edge.target) {
            return Ok(Vec::new());
        }
        current = edge.target;
    }
}

// ---------------------------------------------------------------------------
// Assigner
// ---------------------------------------------------------------------------

/// Applies selections on one topic and runs the resulting cascades.
///
/// Every node whose targeted, PROVISIONAL or ANCHORED edges were rewritten
/// is remembered; [`Assigner::finish`] hands that set to the caller so the
/// invalidation strategy can start from it.
pub struct Assigner<'a, S> {
    store: &'a mut S,
    nav: Navigator,
    work: Vec<Cascade>,
    touched: IndexSet<NodeId>,
}

impl<'a, S: GraphStore> Assigner<'a, S> {
    pub fn new(store: &'a mut S, nav: Navigator) -> Self {
        Assigner {
            store,
            nav,
            work: Vec::new(),
            touched: IndexSet::new(),
        }
    }

    /// Nodes whose selection-related edges were rewritten, in the order
    /// they were first touched.
    pub fn finish(self) -> Vec<NodeId> {
        self.touched.into_iter().collect()
    }

    /// Replaces `source`'s selection and restores the provisional edges
    /// around it.
    pub fn select(&mut self, source: NodeId, selection: Selection) -> Result<(), EngineError> {
        self.check_selection(source, selection)?;
        let nav = self.nav;

        let was_connected = nav.is_connected(&*self.store, source)?;

        if let Some(edge) = nav.targeted_out(&*self.store, source)? {
            self.store.delete_edge(edge.id)?;
        }
        if let Some(edge) = nav.anchored_out(&*self.store, source)? {
            self.store.delete_edge(edge.id)?;
        }

        match selection {
            Selection::Target(target) => {
                self.store.create_edge(source, target, nav.manual(), None)?;
            }
            Selection::Content(content) => {
                self.store.create_edge(source, content, nav.anchored(), None)?;
                let seen = self
                    .store
                    .edges_out(source, &[nav.once_anchored()])?
                    .iter()
                    .any(|edge| edge.target == content);
                if !seen {
                    self.store
                        .create_edge(source, content, nav.once_anchored(), None)?;
                }
            }
            Selection::Clear => {
                if let Some(target) = provisional_target(&*self.store, &nav, source)? {
                    self.store.create_edge(source, target, nav.provisional(), None)?;
                }
            }
        }
        self.touched.insert(source);
        tracing::debug!(topic = %nav.topic(), %source, ?selection, "selection written");

        let members = cycle(&*self.store, &nav, source)?;
        if !members.is_empty() {
            self.break_cycle(&members)?;
        } else {
            let now_connected = nav.is_connected(&*self.store, source)?;
            match (was_connected, now_connected) {
                (true, false) => self.push_incoming(source, Cascade::Lost)?,
                (false, true) => self.push_incoming(source, Cascade::Gained)?,
                _ => {}
            }
        }

        self.drain()
    }

    /// Propagates a gain of connectivity across `edge`.
    pub fn flip_gained(&mut self, edge: Edge) -> Result<(), EngineError> {
        self.work.push(Cascade::Gained(edge));
        self.drain()
    }

    /// Propagates a loss of connectivity across `edge`.
    pub fn flip_lost(&mut self, edge: Edge) -> Result<(), EngineError> {
        self.work.push(Cascade::Lost(edge));
        self.drain()
    }

    fn check_selection(&self, source: NodeId, selection: Selection) -> Result<(), EngineError> {
        if self.store.node_kind(source)? != NodeKind::Participant {
            return Err(EngineError::precondition(format!(
                "node {source} is content and cannot select"
            )));
        }
        match selection {
            Selection::Target(target) if self.store.node_kind(target)? != NodeKind::Participant => {
                Err(EngineError::precondition(format!(
                    "cannot target content node {target}, anchor on it instead"
                )))
            }
            Selection::Content(content) if self.store.node_kind(content)? != NodeKind::Content => {
                Err(EngineError::precondition(format!(
                    "cannot anchor on participant node {content}"
                )))
            }
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Cascade processing
    // -----------------------------------------------------------------------

    fn push_incoming(
        &mut self,
        node: NodeId,
        step: fn(Edge) -> Cascade,
    ) -> Result<(), EngineError> {
        for edge in self.nav.incoming(&*self.store, node)? {
            self.work.push(step(edge));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), EngineError> {
        while let Some(item) = self.work.pop() {
            match item {
                Cascade::Gained(edge) => {
                    if self.still_holds(&edge, true)? {
                        self.gained(edge)?;
                    }
                }
                Cascade::Lost(edge) => {
                    if self.still_holds(&edge, false)? {
                        self.lost(edge)?;
                    }
                }
                Cascade::CycleCheck(node) => {
                    let members = cycle(&*self.store, &self.nav, node)?;
                    if !members.is_empty() {
                        self.break_cycle(&members)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether `edge` is still in the store unchanged and its target's
    /// connectivity still matches `connected`.
    fn still_holds(&self, edge: &Edge, connected: bool) -> Result<bool, EngineError> {
        if self.store.edge(edge.id)?.as_ref() != Some(edge) {
            tracing::debug!(edge = %edge.id, "dropping cascade step for a rewritten edge");
            return Ok(false);
        }
        Ok(self.nav.is_connected(&*self.store, edge.target)? == connected)
    }

    fn gained(&mut self, edge: Edge) -> Result<(), EngineError> {
        let nav = self.nav;
        let node = edge.source;
        match edge.ty {
            EdgeType::Manual(_) => self.push_incoming(node, Cascade::Gained),
            EdgeType::Ranked => {
                if nav.manual_out(&*self.store, node)?.is_some()
                    || nav.is_anchored(&*self.store, node)?
                {
                    return Ok(());
                }
                match nav.provisional_out(&*self.store, node)? {
                    Some(current) => {
                        if current.target == edge.target {
                            return Ok(());
                        }
                        let best = provisional_target(&*self.store, &nav, node)?;
                        if best == Some(edge.target) {
                            self.store.delete_edge(current.id)?;
                            self.store
                                .create_edge(node, edge.target, nav.provisional(), None)?;
                            self.touched.insert(node);
                            self.work.push(Cascade::CycleCheck(node));
                        }
                        Ok(())
                    }
                    None => {
                        self.store
                            .create_edge(node, edge.target, nav.provisional(), None)?;
                        self.touched.insert(node);
                        // The cycle check pops first, so a provisional edge
                        // that closes a cycle is gone before its gain spreads.
                        self.push_incoming(node, Cascade::Gained)?;
                        self.work.push(Cascade::CycleCheck(node));
                        Ok(())
                    }
                }
            }
            _ => Ok(()),
        }
    }

    fn lost(&mut self, edge: Edge) -> Result<(), EngineError> {
        let nav = self.nav;
        let node = edge.source;
        match edge.ty {
            EdgeType::Manual(_) => self.push_incoming(node, Cascade::Lost),
            EdgeType::Provisional(_) => {
                self.store.delete_edge(edge.id)?;
                self.touched.insert(node);
                match provisional_target(&*self.store, &nav, node)? {
                    Some(target) => {
                        self.store.create_edge(node, target, nav.provisional(), None)?;
                        self.work.push(Cascade::CycleCheck(node));
                        Ok(())
                    }
                    None => self.push_incoming(node, Cascade::Lost),
                }
            }
            _ => Ok(()),
        }
    }

    /// Deletes every PROVISIONAL edge on the cycle and queues a loss for
    /// every targeted edge entering it from outside.
    fn break_cycle(&mut self, members: &[NodeId]) -> Result<(), EngineError> {
        let nav = self.nav;
        tracing::warn!(topic = %nav.topic(), ?members, "breaking targeted cycle");

        let inside: HashSet<NodeId> = members.iter().copied().collect();
        for &member in members {
            if let Some(edge) = nav.provisional_out(&*self.store, member)? {
                self.store.delete_edge(edge.id)?;
                self.touched.insert(member);
            }
        }
        for &member in members {
            for edge in nav.targeted_incoming(&*self.store, member)? {
                if !inside.contains(&edge.source) {
                    self.work.push(Cascade::Lost(edge));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ranked edges
// ---------------------------------------------------------------------------

/// Replaces every RANKED edge of `source` with `targets`, ranked `1..=n` in
/// the given order.
pub fn replace_ranked<S: GraphStore>(
    store: &mut S,
    source: NodeId,
    targets: &[NodeId],
) -> Result<(), EngineError> {
    if store.node_kind(source)? != NodeKind::Participant {
        return Err(EngineError::precondition(format!(
            "node {source} is content and cannot rank"
        )));
    }
    let mut seen = HashSet::new();
    for &target in targets {
        if target == source {
            return Err(EngineError::precondition(format!(
                "node {source} cannot rank itself"
            )));
        }
        if !seen.insert(target) {
            return Err(EngineError::precondition(format!(
                "node {target} is ranked more than once"
            )));
        }
        if store.node_kind(target)? != NodeKind::Participant {
            return Err(EngineError::precondition(format!(
                "cannot rank content node {target}"
            )));
        }
    }

    for edge in store.edges_out(source, &[EdgeType::Ranked])? {
        store.delete_edge(edge.id)?;
    }
    for (rank, &target) in (1i64..).zip(targets) {
        store.create_edge(source, target, EdgeType::Ranked, Some(rank))?;
    }
    Ok(())
}
