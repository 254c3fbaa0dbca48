//! Identifier newtypes.
//!
//! Node ids double as arena slots in the in-memory backend and as primary
//! keys in SQLite. Edge ids come from a per-store counter. Topic ids are
//! picked by callers and carry no meaning inside the graph.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// A participant or content node, numbered densely from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// An edge, numbered from 1 in creation order. Ids are never reused, so
/// sorting by `EdgeId` sorts by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Scope of every per-topic edge and flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicId(pub u64);

macro_rules! display_inner {
    ($($id:ty),*) => {
        $(
            impl fmt::Display for $id {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }
        )*
    };
}

display_inner!(NodeId, EdgeId, TopicId);

impl From<NodeIndex<u32>> for NodeId {
    fn from(slot: NodeIndex<u32>) -> Self {
        NodeId(slot.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(node: NodeId) -> Self {
        NodeIndex::new(node.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_maps_to_arena_slot() {
        let slot: NodeIndex<u32> = NodeId(42).into();
        assert_eq!(slot.index(), 42);
        assert_eq!(NodeId::from(slot), NodeId(42));
    }

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(NodeId(7).to_string(), "7");
        assert_eq!(EdgeId(99).to_string(), "99");
        assert_eq!(TopicId(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn node_ids_order_numerically() {
        let mut ids = vec![NodeId(10), NodeId(2), NodeId(7)];
        ids.sort();
        assert_eq!(ids, vec![NodeId(2), NodeId(7), NodeId(10)]);
    }

    #[test]
    fn serde_is_transparent_number() {
        let json = serde_json::to_string(&TopicId(12)).unwrap();
        assert_eq!(json, "12");
        let back: NodeId = serde_json::from_str("5").unwrap();
        assert_eq!(back, NodeId(5));
    }
}
