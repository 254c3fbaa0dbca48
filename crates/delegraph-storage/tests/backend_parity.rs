//! Both backends must behave identically for the same sequence of writes.

use delegraph_core::{EdgeType, Flag, NodeId, NodeKind, TopicId};
use delegraph_storage::{connectivity_digest, GraphStore, InMemoryStore, SqliteStore, StorageError};

const T: TopicId = TopicId(7);

/// Applies a fixed script of writes and returns the edge ids it created.
fn script<S: GraphStore>(store: &mut S) -> Vec<u32> {
    let nodes: Vec<NodeId> = (0..4)
        .map(|i| {
            let kind = if i == 3 { NodeKind::Content } else { NodeKind::Participant };
            store.add_node(kind).unwrap()
        })
        .collect();
    let (a, b, c, content) = (nodes[0], nodes[1], nodes[2], nodes[3]);

    let mut ids = Vec::new();
    ids.push(store.create_edge(a, b, EdgeType::Ranked, Some(1)).unwrap());
    ids.push(store.create_edge(b, c, EdgeType::Manual(T), None).unwrap());
    ids.push(store.create_edge(c, content, EdgeType::Anchored(T), None).unwrap());
    ids.push(store.create_edge(a, c, EdgeType::Connected(T), None).unwrap());
    ids.push(store.create_edge(b, c, EdgeType::Connected(T), None).unwrap());
    store.delete_edge(ids[3]).unwrap();
    ids.push(store.create_edge(a, c, EdgeType::Connected(T), None).unwrap());
    store.set_flag(c, Flag::Disjoint(TopicId(9))).unwrap();

    ids.into_iter().map(|id| id.0).collect()
}

fn assert_same_view<A: GraphStore, B: GraphStore>(a: &A, b: &B) {
    assert_eq!(a.nodes().unwrap(), b.nodes().unwrap());
    assert_eq!(a.topics().unwrap(), b.topics().unwrap());
    for node in a.nodes().unwrap() {
        let all = [
            EdgeType::Ranked,
            EdgeType::Manual(T),
            EdgeType::Anchored(T),
            EdgeType::Connected(T),
        ];
        assert_eq!(a.edges_out(node, &all).unwrap(), b.edges_out(node, &all).unwrap());
        assert_eq!(a.edges_in(node, &all).unwrap(), b.edges_in(node, &all).unwrap());
    }
    assert_eq!(
        connectivity_digest(a, T).unwrap(),
        connectivity_digest(b, T).unwrap()
    );
}

#[test]
fn memory_and_sqlite_agree() {
    let mut memory = InMemoryStore::new();
    let mut sqlite = SqliteStore::in_memory().unwrap();

    let memory_ids = script(&mut memory);
    let sqlite_ids = script(&mut sqlite);

    assert_eq!(memory_ids, sqlite_ids);
    assert_same_view(&memory, &sqlite);
}

#[test]
fn file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let path = path.to_str().unwrap();

    let expected = {
        let mut store = SqliteStore::new(path).unwrap();
        script(&mut store);
        connectivity_digest(&store, T).unwrap()
    };

    let reopened = SqliteStore::new(path).unwrap();
    assert_eq!(reopened.nodes().unwrap().len(), 4);
    assert_eq!(connectivity_digest(&reopened, T).unwrap(), expected);
    assert_eq!(reopened.node_kind(NodeId(3)).unwrap(), NodeKind::Content);
}

fn failing_update<S: GraphStore>(store: &mut S) {
    let result: Result<(), StorageError> = store.transaction(|s| {
        s.create_edge(NodeId(0), NodeId(1), EdgeType::Manual(TopicId(3)), None)?;
        s.set_flag(NodeId(0), Flag::Disjoint(T))?;
        s.delete_edge(delegraph_core::EdgeId(999))
    });
    assert!(matches!(result, Err(StorageError::EdgeNotFound(_))));
}

#[test]
fn failed_transactions_leave_both_backends_unchanged() {
    let mut memory = InMemoryStore::new();
    let mut sqlite = SqliteStore::in_memory().unwrap();
    script(&mut memory);
    script(&mut sqlite);
    let before = connectivity_digest(&memory, T).unwrap();

    failing_update(&mut memory);
    failing_update(&mut sqlite);

    assert!(memory.edges_out(NodeId(0), &[EdgeType::Manual(TopicId(3))]).unwrap().is_empty());
    assert!(!sqlite.has_flag(NodeId(0), Flag::Disjoint(T)).unwrap());
    assert_eq!(connectivity_digest(&memory, T).unwrap(), before);
    assert_same_view(&memory, &sqlite);
}
