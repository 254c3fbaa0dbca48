//! ConnectivityService: the single entry point for updates and queries.
//!
//! Every update runs inside one store transaction: the selection is written,
//! its cascades drain, and the configured invalidation strategy repairs the
//! cache before the transaction commits. Any error rolls the whole update
//! back.

use serde::{Deserialize, Serialize};

use delegraph_core::{NodeId, NodeKind, TopicId};
use delegraph_storage::{connectivity_digest, GraphStore};

use crate::analysis::{self, NeighborReport};
use crate::assignment::{self, Assigner, Selection};
use crate::error::EngineError;
use crate::invalidation::{InvalidationReport, InvalidationStrategy, StrategyKind};
use crate::navigator::Navigator;
use crate::resolve;

/// The outcome of an update on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicReport {
    pub topic: TopicId,
    /// Nodes whose selection-related edges were rewritten.
    pub touched: usize,
    pub invalidation: InvalidationReport,
}

/// Owns a store and keeps its connectivity cache consistent across updates.
pub struct ConnectivityService<S> {
    store: S,
    strategy: StrategyKind,
}

impl<S: GraphStore> ConnectivityService<S> {
    pub fn new(store: S, strategy: StrategyKind) -> Self {
        ConnectivityService { store, strategy }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, EngineError> {
        Ok(self.store.add_node(kind)?)
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Points `source` at `target` with a MANUAL edge, or clears its manual
    /// choice when `target` is `None`.
    pub fn set_target(
        &mut self,
        topic: TopicId,
        source: NodeId,
        target: Option<NodeId>,
    ) -> Result<TopicReport, EngineError> {
        let selection = match target {
            Some(target) => Selection::Target(target),
            None => Selection::Clear,
        };
        self.update(topic, source, selection)
    }

    /// Anchors `source` on `content`, or drops its anchor when `content` is
    /// `None`.
    pub fn set_anchor_content(
        &mut self,
        topic: TopicId,
        source: NodeId,
        content: Option<NodeId>,
    ) -> Result<TopicReport, EngineError> {
        let selection = match content {
            Some(content) => Selection::Content(content),
            None => Selection::Clear,
        };
        self.update(topic, source, selection)
    }

    /// Replaces the ranked candidates of `source` and refreshes its
    /// provisional target on every known topic.
    pub fn set_ranked(
        &mut self,
        source: NodeId,
        targets: &[NodeId],
    ) -> Result<Vec<TopicReport>, EngineError> {
        let strategy = self.strategy;
        let reports = self.store.transaction(|store| {
            assignment::replace_ranked(store, source, targets)?;

            let mut reports = Vec::new();
            for topic in store.topics()? {
                let nav = Navigator::new(topic);
                let mut touched = Vec::new();
                if nav.manual_out(&*store, source)?.is_none()
                    && !nav.is_anchored(&*store, source)?
                {
                    let mut assigner = Assigner::new(store, nav);
                    assigner.select(source, Selection::Clear)?;
                    touched = assigner.finish();
                }
                if !touched.contains(&source) {
                    touched.push(source);
                }
                let invalidation = strategy.apply(store, &nav, &touched)?;
                reports.push(TopicReport {
                    topic,
                    touched: touched.len(),
                    invalidation,
                });
            }
            Ok::<_, EngineError>(reports)
        })?;

        tracing::info!(
            %source,
            ranked = targets.len(),
            topics = reports.len(),
            strategy = %strategy,
            "ranked candidates replaced"
        );
        Ok(reports)
    }

    fn update(
        &mut self,
        topic: TopicId,
        source: NodeId,
        selection: Selection,
    ) -> Result<TopicReport, EngineError> {
        let strategy = self.strategy;
        let nav = Navigator::new(topic);
        let report = self.store.transaction(|store| {
            let mut assigner = Assigner::new(store, nav);
            assigner.select(source, selection)?;
            let touched = assigner.finish();
            let invalidation = strategy.apply(store, &nav, &touched)?;
            Ok::<_, EngineError>(TopicReport {
                topic,
                touched: touched.len(),
                invalidation,
            })
        })?;

        tracing::info!(
            %topic,
            %source,
            ?selection,
            strategy = %strategy,
            walked = report.invalidation.walked,
            changed = report.invalidation.changed,
            "selection committed"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolves `node`, caching the result. `None` means disjoint.
    pub fn resolve(&mut self, topic: TopicId, node: NodeId) -> Result<Option<NodeId>, EngineError> {
        if self.store.node_kind(node)? == NodeKind::Content {
            return Err(EngineError::precondition(format!(
                "node {node} is content and has no connectivity"
            )));
        }
        let nav = Navigator::new(topic);
        let resolution = self
            .store
            .transaction(|store| resolve::resolve(store, &nav, node))?;
        Ok(resolution.anchor())
    }

    /// The cached anchor of an already resolved, connected node.
    pub fn anchor_of(&self, topic: TopicId, node: NodeId) -> Result<NodeId, EngineError> {
        resolve::anchor_of(&self.store, &Navigator::new(topic), node)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn provisional_target(
        &self,
        topic: TopicId,
        node: NodeId,
    ) -> Result<Option<NodeId>, EngineError> {
        assignment::provisional_target(&self.store, &Navigator::new(topic), node)
    }

    pub fn cycle(&self, topic: TopicId, node: NodeId) -> Result<Vec<NodeId>, EngineError> {
        assignment::cycle(&self.store, &Navigator::new(topic), node)
    }

    pub fn designated_anchor(
        &self,
        topic: TopicId,
        node: NodeId,
    ) -> Result<Option<NodeId>, EngineError> {
        analysis::designated_anchor(&self.store, &Navigator::new(topic), node)
    }

    pub fn influence(&self, topic: TopicId, node: NodeId) -> Result<usize, EngineError> {
        analysis::influence(&self.store, &Navigator::new(topic), node)
    }

    pub fn neighbors(
        &self,
        topic: TopicId,
        node: NodeId,
    ) -> Result<Vec<NeighborReport>, EngineError> {
        analysis::neighbors(&self.store, &Navigator::new(topic), node)
    }

    /// Digest of the topic's cached resolutions.
    pub fn digest(&self, topic: TopicId) -> Result<blake3::Hash, EngineError> {
        Ok(connectivity_digest(&self.store, topic)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegraph_core::EdgeType;
    use delegraph_storage::InMemoryStore;

    const T: TopicId = TopicId(7);

    fn service() -> ConnectivityService<InMemoryStore> {
        ConnectivityService::new(InMemoryStore::new(), StrategyKind::default())
    }

    #[test]
    fn anchoring_connects_upstream_provisionally() {
        let mut svc = service();
        let a = svc.add_node(NodeKind::Participant).unwrap();
        let b = svc.add_node(NodeKind::Participant).unwrap();
        let content = svc.add_node(NodeKind::Content).unwrap();

        svc.set_ranked(a, &[b]).unwrap();
        svc.set_anchor_content(T, b, Some(content)).unwrap();

        let nav = Navigator::new(T);
        let provisional = nav.provisional_out(svc.store(), a).unwrap().unwrap();
        assert_eq!(provisional.target, b);
        assert_eq!(svc.resolve(T, a).unwrap(), Some(b));
        assert_eq!(svc.anchor_of(T, a).unwrap(), b);
    }

    #[test]
    fn set_ranked_refreshes_provisional_target() {
        let mut svc = service();
        let a = svc.add_node(NodeKind::Participant).unwrap();
        let b = svc.add_node(NodeKind::Participant).unwrap();
        let c = svc.add_node(NodeKind::Participant).unwrap();
        let content = svc.add_node(NodeKind::Content).unwrap();
        svc.set_anchor_content(T, b, Some(content)).unwrap();
        svc.set_anchor_content(T, c, Some(content)).unwrap();

        svc.set_ranked(a, &[b, c]).unwrap();
        assert_eq!(svc.provisional_target(T, a).unwrap(), Some(b));
        let nav = Navigator::new(T);
        assert_eq!(nav.provisional_out(svc.store(), a).unwrap().unwrap().target, b);

        let reports = svc.set_ranked(a, &[c, b]).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].topic, T);
        assert_eq!(nav.provisional_out(svc.store(), a).unwrap().unwrap().target, c);
        assert_eq!(nav.cached(svc.store(), a).unwrap().and_then(|r| r.anchor()), Some(c));
    }

    #[test]
    fn set_ranked_leaves_manual_choice_alone() {
        let mut svc = service();
        let a = svc.add_node(NodeKind::Participant).unwrap();
        let b = svc.add_node(NodeKind::Participant).unwrap();
        let c = svc.add_node(NodeKind::Participant).unwrap();
        let content = svc.add_node(NodeKind::Content).unwrap();
        svc.set_anchor_content(T, c, Some(content)).unwrap();
        svc.set_target(T, a, Some(b)).unwrap();

        svc.set_ranked(a, &[c]).unwrap();
        let nav = Navigator::new(T);
        assert_eq!(nav.manual_out(svc.store(), a).unwrap().unwrap().target, b);
        assert!(nav.provisional_out(svc.store(), a).unwrap().is_none());
    }

    #[test]
    fn failed_update_rolls_back() {
        let mut svc = service();
        let a = svc.add_node(NodeKind::Participant).unwrap();
        let b = svc.add_node(NodeKind::Participant).unwrap();
        let content = svc.add_node(NodeKind::Content).unwrap();
        svc.set_target(T, a, Some(b)).unwrap();

        // Anchoring onto a participant is rejected before anything is written.
        let err = svc.set_anchor_content(T, a, Some(b)).unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));

        // Ranking a content node fails after nothing else changed.
        let err = svc.set_ranked(a, &[b, content]).unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));

        let nav = Navigator::new(T);
        assert_eq!(nav.manual_out(svc.store(), a).unwrap().unwrap().target, b);
        assert!(svc
            .store()
            .edges_out(a, &[EdgeType::Ranked])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn resolving_content_is_rejected() {
        let mut svc = service();
        let content = svc.add_node(NodeKind::Content).unwrap();
        assert!(matches!(
            svc.resolve(T, content),
            Err(EngineError::Precondition { .. })
        ));
    }

    #[test]
    fn strategies_produce_same_digest() {
        let run = |strategy| {
            let mut svc = ConnectivityService::new(InMemoryStore::new(), strategy);
            let n: Vec<NodeId> = (0..4)
                .map(|_| svc.add_node(NodeKind::Participant).unwrap())
                .collect();
            let content = svc.add_node(NodeKind::Content).unwrap();
            svc.set_ranked(n[0], &[n[1], n[2]]).unwrap();
            svc.set_ranked(n[1], &[n[3]]).unwrap();
            svc.set_anchor_content(T, n[3], Some(content)).unwrap();
            svc.set_anchor_content(T, n[2], Some(content)).unwrap();
            svc.set_anchor_content(T, n[3], None).unwrap();
            for &node in &n {
                svc.resolve(T, node).unwrap();
            }
            svc.digest(T).unwrap()
        };
        assert_eq!(run(StrategyKind::Full), run(StrategyKind::Tracked));
    }
}
