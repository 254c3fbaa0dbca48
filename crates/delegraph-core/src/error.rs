//! Core error types for delegraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! ways a stored label can fail to map back onto the typed data model.

use crate::edge::EdgeKind;
use crate::id::TopicId;
use thiserror::Error;

/// Core errors produced by the delegraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A text label does not name any edge type.
    #[error("invalid edge label: '{label}'")]
    InvalidEdgeLabel { label: String },

    /// A topic-scoped edge kind was given without a topic.
    #[error("edge kind {kind} requires a topic")]
    MissingTopic { kind: EdgeKind },

    /// A topic-independent edge kind was given a topic.
    #[error("edge kind {kind} is topic-independent but got topic {topic}")]
    UnexpectedTopic { kind: EdgeKind, topic: TopicId },

    /// A stored node kind label is unknown.
    #[error("invalid node kind: '{label}'")]
    InvalidNodeKind { label: String },

    /// A stored flag label is unknown.
    #[error("invalid flag: '{label}'")]
    InvalidFlag { label: String },
}
