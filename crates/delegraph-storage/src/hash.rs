//! Deterministic connectivity digests using blake3.
//!
//! A digest fingerprints one topic's connectivity cache: for every node, its
//! CONNECTED target or its disjoint flag. Two stores with equal digests hold
//! identical caches for that topic, whichever backend or invalidation
//! strategy produced them. Digests are derived state, never stored.
//!
//! # Determinism
//!
//! Nodes are hashed in ascending `NodeId` order, and each node contributes a
//! fixed-width record, so the same cache always produces the same hash.

use delegraph_core::{EdgeType, Flag, NodeId, TopicId};

use crate::error::StorageError;
use crate::traits::GraphStore;

/// Record tags. A node with neither a CONNECTED edge nor a disjoint flag is
/// unresolved.
const TAG_UNRESOLVED: u8 = 0;
const TAG_CONNECTED: u8 = 1;
const TAG_DISJOINT: u8 = 2;

/// Hashes one node's cache record into `hasher`.
fn hash_node_record(
    hasher: &mut blake3::Hasher,
    node: NodeId,
    connected: Option<NodeId>,
    disjoint: bool,
) {
    hasher.update(&node.0.to_le_bytes());
    match (connected, disjoint) {
        (Some(anchor), _) => {
            hasher.update(&[TAG_CONNECTED]);
            hasher.update(&anchor.0.to_le_bytes());
        }
        (None, true) => {
            hasher.update(&[TAG_DISJOINT]);
            hasher.update(&0u32.to_le_bytes());
        }
        (None, false) => {
            hasher.update(&[TAG_UNRESOLVED]);
            hasher.update(&0u32.to_le_bytes());
        }
    }
}

/// Computes the blake3 digest of `topic`'s connectivity cache in `store`.
///
/// A node carrying both a CONNECTED edge and a disjoint flag violates the
/// cache invariants and is reported as an integrity error.
pub fn connectivity_digest<S: GraphStore>(
    store: &S,
    topic: TopicId,
) -> Result<blake3::Hash, StorageError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&topic.0.to_le_bytes());

    for node in store.nodes()? {
        let connected = store
            .single_edge_out(node, EdgeType::Connected(topic))?
            .map(|edge| edge.target);
        let disjoint = store.has_flag(node, Flag::Disjoint(topic))?;
        if connected.is_some() && disjoint {
            return Err(StorageError::IntegrityError {
                reason: format!("node {node} is both connected and disjoint on topic {topic}"),
            });
        }
        hash_node_record(&mut hasher, node, connected, disjoint);
    }

    Ok(hasher.finalize())
}
