//! Cache invalidation after the graph changes.
//!
//! After an update the engine knows which nodes had their own edges
//! rewritten. Everything upstream of them may hold a stale CONNECTED edge or
//! disjoint flag. Two strategies bring the cache back in line:
//!
//! - [`FullInvalidation`]: unwind every upstream node, clear its cache, then
//!   resolve each one again. Simple, touches the whole upstream set.
//! - [`FlipTracking`]: re-walk the changed nodes and their direct upstream
//!   neighbors, then move further upstream only past nodes whose resolution
//!   changed or is disjoint.
//!
//! Both leave identical caches behind; they differ only in how much they
//! walk.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use delegraph_core::NodeId;
use delegraph_storage::GraphStore;

use crate::error::EngineError;
use crate::navigator::Navigator;
use crate::resolve::{resolve, resolve_with, Resolution, Tracked};

/// What an invalidation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    /// Nodes whose resolution was recomputed.
    pub walked: usize,
    /// Nodes whose cached resolution differs from before the pass.
    pub changed: usize,
}

/// Restores cache consistency upstream of `changed`.
pub trait InvalidationStrategy {
    fn apply<S: GraphStore>(
        &self,
        store: &mut S,
        nav: &Navigator,
        changed: &[NodeId],
    ) -> Result<InvalidationReport, EngineError>;
}

// ---------------------------------------------------------------------------
// Full invalidation
// ---------------------------------------------------------------------------

/// Clears and re-resolves everything upstream of the changed nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullInvalidation;

impl FullInvalidation {
    /// Collects `changed` and everything transitively upstream of it, in
    /// breadth-first order, clearing each node's cache as it is reached.
    ///
    /// Returns each collected node with the resolution it had cached.
    fn unwind<S: GraphStore>(
        store: &mut S,
        nav: &Navigator,
        changed: &[NodeId],
    ) -> Result<IndexMap<NodeId, Option<Resolution>>, EngineError> {
        let mut collected = IndexMap::new();
        let mut queue = VecDeque::new();

        for &node in changed {
            if !collected.contains_key(&node) {
                collected.insert(node, nav.cached(&*store, node)?);
                nav.clear_connection_state(store, node)?;
                queue.push_back(node);
            }
        }

        while let Some(node) = queue.pop_front() {
            for edge in nav.incoming(&*store, node)? {
                let upstream = edge.source;
                if collected.contains_key(&upstream) {
                    continue;
                }
                collected.insert(upstream, nav.cached(&*store, upstream)?);
                nav.clear_connection_state(store, upstream)?;
                queue.push_back(upstream);
            }
        }

        Ok(collected)
    }
}

impl InvalidationStrategy for FullInvalidation {
    fn apply<S: GraphStore>(
        &self,
        store: &mut S,
        nav: &Navigator,
        changed: &[NodeId],
    ) -> Result<InvalidationReport, EngineError> {
        let collected = Self::unwind(store, nav, changed)?;
        tracing::debug!(topic = %nav.topic(), unwound = collected.len(), "full invalidation");

        let mut report = InvalidationReport {
            walked: collected.len(),
            changed: 0,
        };
        for (&node, &before) in &collected {
            let after = resolve(store, nav, node)?;
            if before != Some(after) {
                report.changed += 1;
            }
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Localized flip tracking
// ---------------------------------------------------------------------------

/// Re-walks changed nodes and spreads upstream only where resolutions flip
/// or may hide a stale cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipTracking;

impl InvalidationStrategy for FlipTracking {
    fn apply<S: GraphStore>(
        &self,
        store: &mut S,
        nav: &Navigator,
        changed: &[NodeId],
    ) -> Result<InvalidationReport, EngineError> {
        let mut policy = Tracked::new();
        let mut queue: VecDeque<NodeId> = changed.iter().copied().collect();
        // A changed node's own edges may have closed or opened a cycle that
        // its upstream cached, even when its resolution stays the same.
        for &node in changed {
            for edge in nav.incoming(&*store, node)? {
                queue.push_back(edge.source);
            }
        }
        let mut flipped = 0;

        while let Some(node) = queue.pop_front() {
            if policy.is_processed(node) {
                continue;
            }
            resolve_with(store, nav, &mut policy, node)?;

            for recomputed in policy.take_recomputed() {
                if recomputed.changed() {
                    flipped += 1;
                }
                if !recomputed.unsettles_upstream() {
                    continue;
                }
                for edge in nav.incoming(&*store, recomputed.node)? {
                    if !policy.is_processed(edge.source) {
                        queue.push_back(edge.source);
                    }
                }
            }
        }

        tracing::debug!(
            topic = %nav.topic(),
            walked = policy.processed(),
            flipped,
            "flip tracking"
        );
        Ok(InvalidationReport {
            walked: policy.processed(),
            changed: flipped,
        })
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Which invalidation strategy a service runs after each update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// [`FullInvalidation`].
    Full,
    /// [`FlipTracking`].
    #[default]
    Tracked,
}

impl StrategyKind {
    pub fn label(self) -> &'static str {
        match self {
            StrategyKind::Full => "full",
            StrategyKind::Tracked => "tracked",
        }
    }
}

impl InvalidationStrategy for StrategyKind {
    fn apply<S: GraphStore>(
        &self,
        store: &mut S,
        nav: &Navigator,
        changed: &[NodeId],
    ) -> Result<InvalidationReport, EngineError> {
        match self {
            StrategyKind::Full => FullInvalidation.apply(store, nav, changed),
            StrategyKind::Tracked => FlipTracking.apply(store, nav, changed),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(StrategyKind::Full),
            "tracked" => Ok(StrategyKind::Tracked),
            _ => Err(EngineError::precondition(format!(
                "unknown invalidation strategy '{s}', expected 'full' or 'tracked'"
            ))),
        }
    }
}
