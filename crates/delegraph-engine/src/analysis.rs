//! Read-only queries over the live targeted graph.
//!
//! None of these consult the CONNECTED cache; they follow MANUAL and
//! PROVISIONAL edges as they currently stand.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use delegraph_core::NodeId;
use delegraph_storage::GraphStore;

use crate::error::EngineError;
use crate::navigator::Navigator;

/// How a neighbor relates to the node it was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// One of the node's ranked candidates.
    Ranked { rank: i64 },
    /// The node's MANUAL target, not among its ranked candidates.
    Manual,
    /// The node's PROVISIONAL target, not among its ranked candidates.
    Provisional,
}

/// One adjacent node as seen from a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborReport {
    pub node: NodeId,
    pub relation: Relation,
    /// Whether this neighbor is the node's current targeted next hop.
    pub is_target: bool,
    /// The anchor at the end of the neighbor's targeted chain.
    pub designated_anchor: Option<NodeId>,
    /// The content that anchor holds.
    pub content: Option<NodeId>,
}

/// Follows targeted edges from `node` to the first anchored node.
///
/// `None` if the chain dead-ends or loops.
pub fn designated_anchor<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    node: NodeId,
) -> Result<Option<NodeId>, EngineError> {
    let mut visited = HashSet::new();
    let mut current = node;
    loop {
        if !visited.insert(current) {
            return Ok(None);
        }
        if nav.is_anchored(store, current)? {
            return Ok(Some(current));
        }
        match nav.targeted_out(store, current)? {
            Some(edge) => current = edge.target,
            None => return Ok(None),
        }
    }
}

/// Number of nodes whose targeted chain passes through `node`, counting
/// `node` itself.
pub fn influence<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    node: NodeId,
) -> Result<usize, EngineError> {
    let mut seen = HashSet::from([node]);
    let mut queue = VecDeque::from([node]);
    while let Some(current) = queue.pop_front() {
        for edge in nav.targeted_incoming(store, current)? {
            if seen.insert(edge.source) {
                queue.push_back(edge.source);
            }
        }
    }
    Ok(seen.len())
}

/// Reports every ranked candidate of `node`, plus its current target if
/// that target is not ranked.
pub fn neighbors<S: GraphStore>(
    store: &S,
    nav: &Navigator,
    node: NodeId,
) -> Result<Vec<NeighborReport>, EngineError> {
    let target = nav.targeted_out(store, node)?;
    let target_node = target.map(|edge| edge.target);

    let mut adjacent: Vec<(NodeId, Relation)> = nav
        .ranked_out(store, node)?
        .into_iter()
        .map(|edge| (edge.target, Relation::Ranked { rank: edge.rank.unwrap_or_default() }))
        .collect();

    if let Some(edge) = target {
        if !adjacent.iter().any(|(n, _)| *n == edge.target) {
            let relation = if edge.ty == nav.manual() {
                Relation::Manual
            } else {
                Relation::Provisional
            };
            adjacent.push((edge.target, relation));
        }
    }

    adjacent
        .into_iter()
        .map(|(neighbor, relation)| {
            let anchor = designated_anchor(store, nav, neighbor)?;
            let content = match anchor {
                Some(anchor) => nav.anchored_out(store, anchor)?.map(|edge| edge.target),
                None => None,
            };
            Ok(NeighborReport {
                node: neighbor,
                relation,
                is_target: target_node == Some(neighbor),
                designated_anchor: anchor,
                content,
            })
        })
        .collect()
}
