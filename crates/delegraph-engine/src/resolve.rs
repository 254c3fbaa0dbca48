//! Connectivity resolution: the walk that computes and caches whether a node
//! reaches an anchor.
//!
//! # Walk
//!
//! Starting from a node, the walk tries candidates in priority order (the
//! targeted edge if present, else RANKED edges by ascending rank) and
//! descends into each. The first candidate that reaches an anchor wins and
//! every frame on the way back caches a CONNECTED edge straight to that
//! anchor. Revisiting a node already on the current path yields a cycle
//! marker; every frame it passes through is cached disjoint, up to and
//! including the frame that opened the cycle. That frame's parent moves on
//! to its next candidate.
//!
//! The walk keeps its own frame stack, so chain length is bounded by heap
//! rather than by the thread stack.
//!
//! # Policies
//!
//! A [`WalkPolicy`] decides which nodes are already settled and observes
//! every node the walk recomputes:
//! - [`Memoized`] trusts cached CONNECTED edges, disjoint flags and anchors.
//! - [`Tracked`] trusts only nodes it has itself resolved and records each
//!   node's cached value before the walk overwrote it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use delegraph_core::NodeId;
use delegraph_storage::GraphStore;

use crate::error::EngineError;
use crate::navigator::Navigator;

/// The resolved connectivity of a node on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "anchor")]
pub enum Resolution {
    /// Reaches the given anchor. Anchors resolve to themselves.
    Connected(NodeId),
    /// Reaches no anchor.
    Disjoint,
}

impl Resolution {
    pub fn anchor(self) -> Option<NodeId> {
        match self {
            Resolution::Connected(anchor) => Some(anchor),
            Resolution::Disjoint => None,
        }
    }
}

/// What a finished frame hands back to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Connected(NodeId),
    Disjoint,
    /// The walk ran into `origin`, which is still on the stack.
    Cycle(NodeId),
}

impl From<Resolution> for Outcome {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Connected(anchor) => Outcome::Connected(anchor),
            Resolution::Disjoint => Outcome::Disjoint,
        }
    }
}

/// Decides where a walk may stop early and observes recomputed nodes.
pub trait WalkPolicy {
    /// A trusted resolution for `node`, if the walk may stop there.
    fn settled<S: GraphStore>(
        &self,
        store: &S,
        nav: &Navigator,
        node: NodeId,
    ) -> Result<Option<Resolution>, EngineError>;

    /// Called once per node the walk is about to recompute, before any of
    /// its cached state is touched.
    fn entering<S: GraphStore>(
        &mut self,
        _store: &S,
        _nav: &Navigator,
        _node: NodeId,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// Called with the resolution the walk cached for a recomputed node.
    fn settle(&mut self, _node: NodeId, _resolution: Resolution) {}
}

/// Trusts whatever the store has cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Memoized;

impl WalkPolicy for Memoized {
    fn settled<S: GraphStore>(
        &self,
        store: &S,
        nav: &Navigator,
        node: NodeId,
    ) -> Result<Option<Resolution>, EngineError> {
        nav.cached(store, node)
    }
}

/// Trusts only nodes resolved during the current update cycle, remembering
/// what each one looked like beforehand.
#[derive(Debug, Default)]
pub struct Tracked {
    results: HashMap<NodeId, Resolution>,
    before: HashMap<NodeId, Option<Resolution>>,
    /// Nodes recomputed since the last [`Tracked::take_recomputed`].
    pending: Vec<NodeId>,
}

impl Tracked {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node` has been resolved in this cycle.
    pub fn is_processed(&self, node: NodeId) -> bool {
        self.results.contains_key(&node)
    }

    /// Number of nodes resolved in this cycle.
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// Drains the nodes recomputed since the last call, in the order the
    /// walk entered them.
    pub fn take_recomputed(&mut self) -> Vec<Recomputed> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter_map(|node| {
                let after = self.results.get(&node).copied()?;
                let before = self.before.get(&node).copied().flatten();
                Some(Recomputed {
                    node,
                    before,
                    after,
                })
            })
            .collect()
    }
}

/// A node a [`Tracked`] walk recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputed {
    pub node: NodeId,
    /// What the store had cached before the walk.
    pub before: Option<Resolution>,
    pub after: Resolution,
}

impl Recomputed {
    pub fn changed(&self) -> bool {
        self.before != Some(self.after)
    }

    /// Whether the node's upstream may hold stale state even if this node
    /// itself did not change.
    ///
    /// A disjoint result can come from a cycle the walk closed through the
    /// node, so upstream nodes that were cached disjoint alongside it are
    /// re-walked whenever it is involved.
    pub fn unsettles_upstream(&self) -> bool {
        self.changed()
            || self.after == Resolution::Disjoint
            || self.before == Some(Resolution::Disjoint)
    }
}

impl WalkPolicy for Tracked {
    fn settled<S: GraphStore>(
        &self,
        _store: &S,
        _nav: &Navigator,
        node: NodeId,
    ) -> Result<Option<Resolution>, EngineError> {
        Ok(self.results.get(&node).copied())
    }

    fn entering<S: GraphStore>(
        &mut self,
        store: &S,
        nav: &Navigator,
        node: NodeId,
    ) -> Result<(), EngineError> {
        if !self.before.contains_key(&node) {
            let cached = nav.cached(store, node)?;
            self.before.insert(node, cached);
        }
        self.pending.push(node);
        Ok(())
    }

    fn settle(&mut self, node: NodeId, resolution: Resolution) {
        self.results.insert(node, resolution);
    }
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// A node whose candidates are being tried.
#[derive(Debug)]
struct Frame {
    node: NodeId,
    candidates: Vec<NodeId>,
    /// Index of the next candidate to try.
    next: usize,
}

enum Step {
    Done(Outcome),
    Descend(Frame),
}

/// A single resolution walk. The visited set lives exactly as long as the
/// walk.
struct Walk<'a, S, P> {
    store: &'a mut S,
    nav: &'a Navigator,
    policy: &'a mut P,
    visited: HashSet<NodeId>,
}

impl<S: GraphStore, P: WalkPolicy> Walk<'_, S, P> {
    fn enter(&mut self, node: NodeId) -> Result<Step, EngineError> {
        if let Some(resolution) = self.policy.settled(&*self.store, self.nav, node)? {
            return Ok(Step::Done(resolution.into()));
        }
        if !self.visited.insert(node) {
            return Ok(Step::Done(Outcome::Cycle(node)));
        }

        self.policy.entering(&*self.store, self.nav, node)?;

        if self.nav.is_anchored(&*self.store, node)? {
            self.nav.clear_connection_state(self.store, node)?;
            self.policy.settle(node, Resolution::Connected(node));
            return Ok(Step::Done(Outcome::Connected(node)));
        }

        let candidates = self
            .nav
            .walkable_candidates(&*self.store, node)?
            .into_iter()
            .map(|edge| edge.target)
            .collect();
        Ok(Step::Descend(Frame {
            node,
            candidates,
            next: 0,
        }))
    }

    fn finish_connected(&mut self, node: NodeId, anchor: NodeId) -> Result<(), EngineError> {
        self.nav.write_connected(self.store, node, anchor)?;
        self.policy.settle(node, Resolution::Connected(anchor));
        Ok(())
    }

    fn finish_disjoint(&mut self, node: NodeId) -> Result<(), EngineError> {
        self.nav.write_disjoint(self.store, node)?;
        self.policy.settle(node, Resolution::Disjoint);
        Ok(())
    }

    fn run(&mut self, start: NodeId) -> Result<Resolution, EngineError> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut returned = match self.enter(start)? {
            Step::Done(outcome) => Some(outcome),
            Step::Descend(frame) => {
                stack.push(frame);
                None
            }
        };

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            match returned.take() {
                Some(Outcome::Connected(anchor)) => {
                    stack.pop();
                    self.finish_connected(node, anchor)?;
                    returned = Some(Outcome::Connected(anchor));
                    continue;
                }
                Some(Outcome::Cycle(origin)) => {
                    stack.pop();
                    self.finish_disjoint(node)?;
                    returned = Some(if origin == node {
                        Outcome::Disjoint
                    } else {
                        Outcome::Cycle(origin)
                    });
                    continue;
                }
                Some(Outcome::Disjoint) | None => {}
            }

            match frame.candidates.get(frame.next).copied() {
                Some(candidate) => {
                    frame.next += 1;
                    match self.enter(candidate)? {
                        Step::Done(outcome) => returned = Some(outcome),
                        Step::Descend(child) => stack.push(child),
                    }
                }
                None => {
                    stack.pop();
                    self.finish_disjoint(node)?;
                    returned = Some(Outcome::Disjoint);
                }
            }
        }

        // The start frame absorbs any cycle that opened at it, and no other
        // node can be on the stack once it is gone.
        match returned {
            Some(Outcome::Connected(anchor)) => Ok(Resolution::Connected(anchor)),
            Some(Outcome::Disjoint) | Some(Outcome::Cycle(_)) => Ok(Resolution::Disjoint),
            None => Err(EngineError::integrity(format!(
                "walk from node {start} ended without a result"
            ))),
        }
    }
}

/// Resolves `node` under `policy`, caching the result on every node the walk
/// recomputes.
pub fn resolve_with<S: GraphStore, P: WalkPolicy>(
    store: &mut S,
    nav: &Navigator,
    policy: &mut P,
    node: NodeId,
) -> Result<Resolution, EngineError> {
    let mut walk = Walk {
        store,
        nav,
        policy,
        visited: HashSet::new(),
    };
    let resolution = walk.run(node)?;
    tracing::debug!(
        topic = %nav.topic(),
        %node,
        ?resolution,
        walked = walk.visited.len(),
        "resolved node"
    );
    Ok(resolution)
}

/// Resolves `node`, trusting cached state.
pub fn resolve<S: GraphStore>(
    store: &mut S,
    nav: &Navigator,
    node: NodeId,
) -> Result<Resolution, EngineError> {
    resolve_with(store, nav, &mut Memoized, node)
}

/// The anchor `node` is cached as reaching, without walking.
///
/// Fails if the node is cached disjoint or has not been resolved.
pub fn anchor_of<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    node: NodeId,
) -> Result<NodeId, EngineError> {
    match nav.cached(store, node)? {
        Some(Resolution::Connected(anchor)) => Ok(anchor),
        Some(Resolution::Disjoint) => Err(EngineError::precondition(format!(
            "node {node} is disjoint on topic {}",
            nav.topic()
        ))),
        None => Err(EngineError::precondition(format!(
            "node {node} is unresolved on topic {}",
            nav.topic()
        ))),
    }
}
