//! Recursive materialization against the in-process ledger

use crate::integration::test_utils::{engine, record, wait_until, with_children, SampleTree};
use fsmirror::error::SyncError;
use fsmirror::remote::MemoryLedger;
use fsmirror::sync::MaterializeOutcome;
use fsmirror::tree::path::TreePath;
use std::sync::Arc;

#[tokio::test]
async fn test_sibling_failure_keeps_other_children() {
    let ledger = Arc::new(MemoryLedger::new());
    let a = record("A", None);
    let b = record("B", Some(&a));
    let c = record("C", Some(&a));
    let a = with_children(a, &[&b, &c]);
    ledger.seed(a.clone());
    ledger.seed(b.clone());
    // C is declared but never stored

    let engine = engine(&ledger);
    let report = engine.materialize_all(a.content_hash).await.unwrap();

    assert_eq!(report.attached, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].hash, c.content_hash);

    let tree = engine.snapshot();
    let roots: Vec<_> = tree.roots().collect();
    assert_eq!(roots.len(), 1);
    let (_, root) = roots[0];
    assert_eq!(root.content_hash, a.content_hash);
    let children: Vec<_> = root.live_children().collect();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].1.content_hash, b.content_hash);

    assert!(!engine.contains(&c.content_hash));
    assert_eq!(
        engine.lookup(&b.content_hash),
        Some(TreePath::from_offsets(vec![0, 0]))
    );
    assert!(engine.verify().is_ok());
}

#[tokio::test]
async fn test_missing_hash_surfaces_not_found() {
    let ledger = Arc::new(MemoryLedger::new());
    let engine = engine(&ledger);
    let err = engine.materialize([9u8; 32]).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
    assert!(engine.is_empty());
}

#[tokio::test]
async fn test_redundant_materialize_is_idempotent() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);

    engine.materialize_all(sample.root.content_hash).await.unwrap();
    let before = engine.snapshot();
    assert_eq!(engine.len(), 5);

    let again = engine.materialize(sample.root.content_hash).await.unwrap();
    assert_eq!(again.outcome, MaterializeOutcome::AlreadyPresent);
    assert!(again.subtree.is_empty());
    let report = engine.materialize_all(sample.docs.content_hash).await.unwrap();
    assert_eq!(report.attached, 0);
    assert_eq!(report.already_present, 1);

    assert_eq!(engine.len(), 5);
    assert_eq!(engine.snapshot(), before);
    assert_eq!(ledger.fetch_count(&sample.root.content_hash), 1);
    assert_eq!(ledger.fetch_count(&sample.docs.content_hash), 1);
}

#[tokio::test]
async fn test_every_index_entry_resolves_to_its_node() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);

    engine.materialize_all(sample.root.content_hash).await.unwrap();

    for hash in sample.hashes() {
        let path = engine.lookup(&hash).expect("indexed");
        let node = engine.node_at(&path).expect("path resolves");
        assert_eq!(node.content_hash, hash);
    }
    let entries = engine.index_entries();
    assert_eq!(entries.len(), 5);
    assert!(engine.verify().is_ok());
}

#[tokio::test]
async fn test_child_before_parent_stays_at_root() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);

    let orphan = engine.materialize(sample.notes.content_hash).await.unwrap();
    assert_eq!(orphan.path, Some(TreePath::root(0)));

    engine.materialize_all(sample.root.content_hash).await.unwrap();

    // No reparenting once the parent shows up
    assert_eq!(
        engine.lookup(&sample.notes.content_hash),
        Some(TreePath::root(0))
    );
    assert_eq!(
        engine.lookup(&sample.root.content_hash),
        Some(TreePath::root(1))
    );
    let root = engine.node_at(&TreePath::root(1)).unwrap();
    assert_eq!(root.content_hash, sample.root.content_hash);
    assert_eq!(engine.len(), 5);
    assert!(engine.verify().is_ok());
}

#[tokio::test]
async fn test_enumerated_load_dedups_nested_records() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);

    let report = engine.load(None).await.unwrap();
    assert_eq!(report.enumerated, 5);
    assert_eq!(report.mirrored, 5);
    assert_eq!(report.nodes.attached, 5);
    assert_eq!(report.nodes.already_present, 4);
    assert!(report.nodes.is_complete());
    assert_eq!(engine.snapshot().root_slot_count(), 1);
}

#[tokio::test]
async fn test_rooted_load_mirrors_only_that_folder() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    ledger.seed(record("elsewhere", None));
    let engine = engine(&ledger);

    let report = engine.load(Some(sample.docs.content_hash)).await.unwrap();
    assert_eq!(report.enumerated, 1);
    assert_eq!(report.mirrored, 3);
    assert!(!engine.contains(&sample.root.content_hash));
    assert_eq!(
        engine.lookup(&sample.b.content_hash),
        Some(TreePath::from_offsets(vec![0, 1]))
    );
}

#[tokio::test]
async fn test_concurrent_materializations_of_one_hash_attach_once() {
    let ledger = Arc::new(MemoryLedger::new());
    let file = record("shared.txt", None);
    ledger.seed(file.clone());
    let hash = file.content_hash;
    let gate = ledger.gate_fetch(hash);
    let engine = engine(&ledger);

    let spawn = |engine: fsmirror::sync::SyncEngine| {
        tokio::spawn(async move { engine.materialize(hash).await })
    };
    let first = spawn(engine.clone());
    let second = spawn(engine.clone());
    wait_until(|| ledger.fetch_count(&hash) == 2).await;

    gate.open();
    let mut outcomes = vec![
        first.await.unwrap().unwrap().outcome,
        second.await.unwrap().unwrap().outcome,
    ];
    outcomes.sort_by_key(|o| *o != MaterializeOutcome::Attached);
    assert_eq!(
        outcomes,
        vec![MaterializeOutcome::Attached, MaterializeOutcome::AlreadyPresent]
    );
    assert_eq!(engine.snapshot().root_slot_count(), 1);
    assert_eq!(engine.len(), 1);
    assert!(engine.verify().is_ok());
}
