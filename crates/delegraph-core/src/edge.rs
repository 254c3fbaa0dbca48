//! Edge types for the preference graph.
//!
//! Every edge carries an [`EdgeType`]. Apart from [`EdgeType::Ranked`], which
//! is one trust ranking shared by all topics, each type is scoped to a single
//! topic. The `BASE_topic` text form (`MANUAL_7`, `RANKED`) is only a display
//! and parse format; nothing composes edge kinds out of strings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{EdgeId, NodeId, TopicId};

pub use petgraph::Direction;

/// The base kind of an edge, without its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Explicit user-chosen next hop. Highest priority.
    Manual,
    /// Ordered fallback candidate. Topic-independent, carries a rank.
    Ranked,
    /// Derived cache of the first connected ranked candidate.
    Provisional,
    /// The node holds content directly; points at the content node.
    Anchored,
    /// History marker for every content a node has anchored on a topic.
    OnceAnchored,
    /// Cached shortcut to the resolved anchor.
    Connected,
}

impl EdgeKind {
    /// All kinds, in declaration order.
    pub const ALL: [EdgeKind; 6] = [
        EdgeKind::Manual,
        EdgeKind::Ranked,
        EdgeKind::Provisional,
        EdgeKind::Anchored,
        EdgeKind::OnceAnchored,
        EdgeKind::Connected,
    ];

    /// Upper-case base label used in the text form.
    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::Manual => "MANUAL",
            EdgeKind::Ranked => "RANKED",
            EdgeKind::Provisional => "PROVISIONAL",
            EdgeKind::Anchored => "ANCHORED",
            EdgeKind::OnceAnchored => "ONCE_ANCHORED",
            EdgeKind::Connected => "CONNECTED",
        }
    }

    /// Returns `true` for every kind except [`EdgeKind::Ranked`].
    pub fn is_topic_scoped(self) -> bool {
        !matches!(self, EdgeKind::Ranked)
    }

    fn from_label(label: &str) -> Option<EdgeKind> {
        EdgeKind::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl FromStr for EdgeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::from_label(s).ok_or_else(|| CoreError::InvalidEdgeLabel { label: s.to_string() })
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fully-qualified edge type: base kind plus topic where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    Manual(TopicId),
    Ranked,
    Provisional(TopicId),
    Anchored(TopicId),
    OnceAnchored(TopicId),
    Connected(TopicId),
}

impl EdgeType {
    /// Builds an edge type from its stored parts.
    ///
    /// Fails if a topic-scoped kind has no topic, or if `Ranked` has one.
    pub fn from_parts(kind: EdgeKind, topic: Option<TopicId>) -> Result<EdgeType, CoreError> {
        match (kind, topic) {
            (EdgeKind::Ranked, None) => Ok(EdgeType::Ranked),
            (EdgeKind::Ranked, Some(topic)) => Err(CoreError::UnexpectedTopic { kind, topic }),
            (kind, None) => Err(CoreError::MissingTopic { kind }),
            (EdgeKind::Manual, Some(t)) => Ok(EdgeType::Manual(t)),
            (EdgeKind::Provisional, Some(t)) => Ok(EdgeType::Provisional(t)),
            (EdgeKind::Anchored, Some(t)) => Ok(EdgeType::Anchored(t)),
            (EdgeKind::OnceAnchored, Some(t)) => Ok(EdgeType::OnceAnchored(t)),
            (EdgeKind::Connected, Some(t)) => Ok(EdgeType::Connected(t)),
        }
    }

    /// The base kind of this type.
    pub fn kind(&self) -> EdgeKind {
        match self {
            EdgeType::Manual(_) => EdgeKind::Manual,
            EdgeType::Ranked => EdgeKind::Ranked,
            EdgeType::Provisional(_) => EdgeKind::Provisional,
            EdgeType::Anchored(_) => EdgeKind::Anchored,
            EdgeType::OnceAnchored(_) => EdgeKind::OnceAnchored,
            EdgeType::Connected(_) => EdgeKind::Connected,
        }
    }

    /// The topic this type is scoped to, `None` for ranked edges.
    pub fn topic(&self) -> Option<TopicId> {
        match *self {
            EdgeType::Ranked => None,
            EdgeType::Manual(t)
            | EdgeType::Provisional(t)
            | EdgeType::Anchored(t)
            | EdgeType::OnceAnchored(t)
            | EdgeType::Connected(t) => Some(t),
        }
    }

    /// Returns `true` for MANUAL and PROVISIONAL edges, the two kinds that
    /// can serve as a node's single chosen next hop.
    pub fn is_targeted(&self) -> bool {
        matches!(self, EdgeType::Manual(_) | EdgeType::Provisional(_))
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.topic() {
            Some(topic) => write!(f, "{}_{}", self.kind(), topic),
            None => write!(f, "{}", self.kind()),
        }
    }
}

impl FromStr for EdgeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(kind) = EdgeKind::from_label(s) {
            return EdgeType::from_parts(kind, None);
        }

        // Topic ids are numeric, so the last underscore always separates
        // them from the base label (ONCE_ANCHORED contains one itself).
        let (label, topic) = s
            .rsplit_once('_')
            .ok_or_else(|| CoreError::InvalidEdgeLabel { label: s.to_string() })?;
        let kind = EdgeKind::from_label(label)
            .ok_or_else(|| CoreError::InvalidEdgeLabel { label: s.to_string() })?;
        let topic = topic
            .parse::<u64>()
            .map_err(|_| CoreError::InvalidEdgeLabel { label: s.to_string() })?;
        EdgeType::from_parts(kind, Some(TopicId(topic)))
    }
}

/// An edge as returned by a graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub ty: EdgeType,
    /// Only ranked edges carry a rank.
    pub rank: Option<i64>,
}

impl Edge {
    /// Orders edges by rank ascending, ties broken by edge id.
    ///
    /// Unranked edges sort after every ranked one.
    pub fn rank_order(a: &Edge, b: &Edge) -> Ordering {
        let key = |e: &Edge| (e.rank.unwrap_or(i64::MAX), e.id);
        key(a).cmp(&key(b))
    }

    /// The far end of this edge as seen from `direction`.
    pub fn endpoint(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Outgoing => self.target,
            Direction::Incoming => self.source,
        }
    }
}
