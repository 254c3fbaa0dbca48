//! Node kinds and per-node flags.
//!
//! A graph holds two kinds of node: participants, which delegate and may
//! anchor, and content items, which anchors point at. Flags are boolean
//! per-node markers; like most edge types they are scoped to a topic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::TopicId;

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A participant in the preference graph.
    Participant,
    /// A content item. Only ever the target of ANCHORED edges.
    Content,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Participant => "participant",
            NodeKind::Content => "content",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NodeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participant" => Ok(NodeKind::Participant),
            "content" => Ok(NodeKind::Content),
            _ => Err(CoreError::InvalidNodeKind {
                label: s.to_string(),
            }),
        }
    }
}

/// A boolean marker on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Cached negative reachability result for the topic.
    Disjoint(TopicId),
}

impl Flag {
    /// Base name of the flag, as stored.
    pub fn name(&self) -> &'static str {
        match self {
            Flag::Disjoint(_) => "disjoint",
        }
    }

    pub fn topic(&self) -> TopicId {
        match *self {
            Flag::Disjoint(topic) => topic,
        }
    }

    /// Rebuilds a flag from its stored name and topic.
    pub fn from_parts(name: &str, topic: TopicId) -> Result<Flag, CoreError> {
        match name {
            "disjoint" => Ok(Flag::Disjoint(topic)),
            _ => Err(CoreError::InvalidFlag {
                label: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_label_parses_back() {
        for kind in [NodeKind::Participant, NodeKind::Content] {
            assert_eq!(kind.label().parse::<NodeKind>().unwrap(), kind);
        }
        assert!("opinion".parse::<NodeKind>().is_err());
    }

    #[test]
    fn flag_parts() {
        let flag = Flag::Disjoint(TopicId(4));
        assert_eq!(flag.name(), "disjoint");
        assert_eq!(flag.topic(), TopicId(4));
        assert_eq!(Flag::from_parts("disjoint", TopicId(4)).unwrap(), flag);
        assert!(matches!(
            Flag::from_parts("connected", TopicId(4)),
            Err(CoreError::InvalidFlag { .. })
        ));
    }
}
