//! Both invalidation strategies must leave the same cache behind as
//! resolving the final graph from scratch.
//!
//! Random update sequences are drawn from three families: participants that
//! only pick MANUAL targets, participants whose RANKED candidates all have
//! lower ids, and a general mix of rankings, targets (self-targets
//! included) and anchors in which rankings and targets form cycles.

use proptest::prelude::*;

use delegraph_core::{NodeId, NodeKind, TopicId};
use delegraph_engine::{resolve, ConnectivityService, Navigator, StrategyKind};
use delegraph_storage::{connectivity_digest, GraphStore, InMemoryStore};

const T: TopicId = TopicId(3);
const PARTICIPANTS: usize = 7;

#[derive(Debug, Clone)]
enum Op {
    Target(usize, Option<usize>),
    Anchor(usize, bool),
    Rank(usize, Vec<usize>),
}

fn manual_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..PARTICIPANTS, proptest::option::of(0..PARTICIPANTS))
            .prop_map(|(source, target)| Op::Target(source, target)),
        2 => (0..PARTICIPANTS, any::<bool>()).prop_map(|(source, on)| Op::Anchor(source, on)),
    ]
}

fn ranked_op() -> impl Strategy<Value = Op> {
    let rank = (1..PARTICIPANTS).prop_flat_map(|source| {
        let lower: Vec<usize> = (0..source).collect();
        (
            Just(source),
            proptest::sample::subsequence(lower, 0..=source).prop_shuffle(),
        )
    });
    prop_oneof![
        2 => rank.prop_map(|(source, targets)| Op::Rank(source, targets)),
        2 => (0..PARTICIPANTS, any::<bool>()).prop_map(|(source, on)| Op::Anchor(source, on)),
        1 => (0..PARTICIPANTS).prop_map(|source| Op::Target(source, None)),
    ]
}

fn general_op() -> impl Strategy<Value = Op> {
    let rank = (0..PARTICIPANTS).prop_flat_map(|source| {
        let others: Vec<usize> = (0..PARTICIPANTS).filter(|&n| n != source).collect();
        let len = others.len();
        (
            Just(source),
            proptest::sample::subsequence(others, 0..=len).prop_shuffle(),
        )
    });
    prop_oneof![
        3 => rank.prop_map(|(source, targets)| Op::Rank(source, targets)),
        2 => (0..PARTICIPANTS, proptest::option::of(0..PARTICIPANTS))
            .prop_map(|(source, target)| Op::Target(source, target)),
        2 => (0..PARTICIPANTS, any::<bool>()).prop_map(|(source, on)| Op::Anchor(source, on)),
    ]
}

/// Runs `ops` under `strategy`, then resolves every participant.
fn run(ops: &[Op], strategy: StrategyKind) -> (InMemoryStore, Vec<NodeId>) {
    let mut svc = ConnectivityService::new(InMemoryStore::new(), strategy);
    let nodes: Vec<NodeId> = (0..PARTICIPANTS)
        .map(|_| svc.add_node(NodeKind::Participant).unwrap())
        .collect();
    let content = svc.add_node(NodeKind::Content).unwrap();

    for op in ops {
        match op {
            Op::Target(source, target) => {
                svc.set_target(T, nodes[*source], target.map(|t| nodes[t]))
                    .unwrap();
            }
            Op::Anchor(source, on) => {
                svc.set_anchor_content(T, nodes[*source], on.then_some(content))
                    .unwrap();
            }
            Op::Rank(source, targets) => {
                let targets: Vec<NodeId> = targets.iter().map(|&t| nodes[t]).collect();
                svc.set_ranked(nodes[*source], &targets).unwrap();
            }
        }
    }
    for &node in &nodes {
        svc.resolve(T, node).unwrap();
    }
    (svc.into_store(), nodes)
}

/// Drops every cached resolution and resolves again.
fn from_scratch(mut store: InMemoryStore, nodes: &[NodeId]) -> blake3::Hash {
    let nav = Navigator::new(T);
    for &node in nodes {
        nav.clear_connection_state(&mut store, node).unwrap();
    }
    for &node in nodes {
        resolve::resolve(&mut store, &nav, node).unwrap();
    }
    connectivity_digest(&store, T).unwrap()
}

fn assert_strategies_agree(ops: &[Op]) -> Result<(), TestCaseError> {
    let (full, nodes) = run(ops, StrategyKind::Full);
    let (tracked, _) = run(ops, StrategyKind::Tracked);

    let full_digest = connectivity_digest(&full, T).unwrap();
    let tracked_digest = connectivity_digest(&tracked, T).unwrap();
    prop_assert_eq!(full_digest, tracked_digest);
    prop_assert_eq!(from_scratch(tracked, &nodes), tracked_digest);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn manual_targets_agree(ops in proptest::collection::vec(manual_op(), 1..24)) {
        assert_strategies_agree(&ops)?;
    }

    #[test]
    fn ranked_dag_agrees(ops in proptest::collection::vec(ranked_op(), 1..24)) {
        assert_strategies_agree(&ops)?;
    }

    #[test]
    fn mixed_rankings_and_targets_agree(ops in proptest::collection::vec(general_op(), 1..24)) {
        assert_strategies_agree(&ops)?;
    }

    #[test]
    fn resolution_is_idempotent(ops in proptest::collection::vec(ranked_op(), 1..16)) {
        let (mut store, nodes) = run(&ops, StrategyKind::Tracked);
        let before = connectivity_digest(&store, T).unwrap();
        let nav = Navigator::new(T);
        for &node in &nodes {
            resolve::resolve(&mut store, &nav, node).unwrap();
        }
        prop_assert_eq!(connectivity_digest(&store, T).unwrap(), before);
    }
}

#[test]
fn tracked_rewalks_cycle_closed_through_unchanged_node() {
    let ops = [
        Op::Rank(6, vec![2]),
        Op::Anchor(3, true),
        Op::Target(0, Some(6)),
        Op::Rank(2, vec![0, 3]),
        Op::Anchor(0, false),
    ];
    let (full, nodes) = run(&ops, StrategyKind::Full);
    let (tracked, _) = run(&ops, StrategyKind::Tracked);

    let nav = Navigator::new(T);
    for node in [nodes[2], nodes[6]] {
        assert_eq!(
            nav.cached(&tracked, node).unwrap().and_then(|r| r.anchor()),
            Some(nodes[3]),
            "node {node}"
        );
    }
    assert_eq!(
        connectivity_digest(&full, T).unwrap(),
        connectivity_digest(&tracked, T).unwrap()
    );
}
