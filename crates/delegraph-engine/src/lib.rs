//! Connectivity engine for delegraph preference graphs.
//!
//! Answers, per topic, whether a participant's chain of delegations reaches
//! an anchor, and keeps that answer cached on the graph as CONNECTED edges
//! and disjoint flags.
//!
//! # Modules
//!
//! - [`navigator`]: per-topic typed reads and cache writes over a store
//! - [`resolve`]: the resolution walk and its caching policies
//! - [`invalidation`]: strategies that repair the cache after updates
//! - [`assignment`]: selections, provisional edges and cycle breaking
//! - [`analysis`]: live read-only queries (influence, neighbors)
//! - [`service`]: [`ConnectivityService`], the transactional entry point
//! - [`error`]: EngineError enum

pub mod analysis;
pub mod assignment;
pub mod error;
pub mod invalidation;
pub mod navigator;
pub mod resolve;
pub mod service;

pub use analysis::{NeighborReport, Relation};
pub use assignment::Selection;
pub use error::EngineError;
pub use invalidation::{
    FlipTracking, FullInvalidation, InvalidationReport, InvalidationStrategy, StrategyKind,
};
pub use navigator::Navigator;
pub use resolve::Resolution;
pub use service::{ConnectivityService, TopicReport};
