//! Notification dispatch, the watch loop, and removal racing in-flight fetches

use crate::integration::test_utils::{engine, engine_with, record, wait_until, with_children, SampleTree};
use fsmirror::config::SyncConfig;
use fsmirror::permissions::Operation;
use fsmirror::remote::{MemoryLedger, Notification};
use fsmirror::sync::{DispatchOutcome, UpdatePolicy};
use fsmirror::tree::path::TreePath;
use fsmirror::types::Identity;
use std::sync::Arc;

#[tokio::test]
async fn test_removed_subtree_leaves_no_index_entries() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);
    engine.materialize_all(sample.root.content_hash).await.unwrap();

    let outcome = engine
        .apply(Notification::Removed {
            hash: sample.docs.content_hash,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Removed { nodes: 3, .. }));

    for hash in [sample.docs.content_hash, sample.a.content_hash, sample.b.content_hash] {
        assert!(!engine.contains(&hash));
    }
    // Later siblings keep their offsets
    assert_eq!(
        engine.lookup(&sample.notes.content_hash),
        Some(TreePath::from_offsets(vec![0, 1]))
    );
    assert_eq!(engine.len(), 2);
    assert!(engine.verify().is_ok());
}

#[tokio::test]
async fn test_removed_for_unmirrored_hash_is_noop() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);
    engine.materialize_all(sample.docs.content_hash).await.unwrap();
    let before = engine.snapshot();

    let outcome = engine
        .apply(Notification::Removed {
            hash: sample.notes.content_hash,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::NotMirrored(_)));
    assert_eq!(engine.snapshot(), before);
}

#[tokio::test]
async fn test_removal_revokes_inflight_materialization() {
    let ledger = Arc::new(MemoryLedger::new());
    let file = record("slow.bin", None);
    ledger.seed(file.clone());
    let hash = file.content_hash;
    let gate = ledger.gate_fetch(hash);
    let engine = engine(&ledger);

    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .apply(Notification::Inserted { hash, index: 0 })
                .await
        })
    };
    wait_until(|| ledger.fetch_count(&hash) == 1).await;

    let removal = engine.apply(Notification::Removed { hash }).await.unwrap();
    assert!(matches!(removal, DispatchOutcome::NotMirrored(_)));

    gate.open();
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome.label(), "revoked");
    assert!(!engine.contains(&hash));
    assert!(engine.is_empty());
}

#[tokio::test]
async fn test_watch_loop_mirrors_published_inserts_and_removals() {
    let ledger = Arc::new(MemoryLedger::new());
    let sample = SampleTree::new();
    sample.seed(&ledger);
    let engine = engine(&ledger);
    engine.begin_watching().unwrap();

    ledger.publish(Notification::Inserted {
        hash: sample.root.content_hash,
        index: 0,
    });
    wait_until(|| engine.len() == 5).await;

    ledger.publish(Notification::Removed {
        hash: sample.docs.content_hash,
    });
    wait_until(|| !engine.contains(&sample.docs.content_hash)).await;
    assert!(!engine.contains(&sample.a.content_hash));
    assert!(engine.contains(&sample.notes.content_hash));

    assert!(engine.stop_watching().await);
    assert_eq!(ledger.subscriber_count(), 0);
}

#[tokio::test]
async fn test_hung_fetch_does_not_block_later_notifications() {
    let ledger = Arc::new(MemoryLedger::new());
    let slow = record("slow", None);
    let fast = record("fast", None);
    ledger.seed(slow.clone());
    ledger.seed(fast.clone());
    let gate = ledger.gate_fetch(slow.content_hash);
    let engine = engine(&ledger);
    engine.begin_watching().unwrap();

    ledger.publish(Notification::Inserted {
        hash: slow.content_hash,
        index: 0,
    });
    ledger.publish(Notification::Inserted {
        hash: fast.content_hash,
        index: 1,
    });
    wait_until(|| engine.contains(&fast.content_hash)).await;
    assert!(!engine.contains(&slow.content_hash));

    gate.open();
    wait_until(|| engine.contains(&slow.content_hash)).await;
    assert!(engine.verify().is_ok());
    engine.stop_watching().await;
}

#[tokio::test]
async fn test_update_declaring_new_child_materializes_it() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("folder", None);
    ledger.seed(folder.clone());
    let engine = engine(&ledger);
    engine.materialize(folder.content_hash).await.unwrap();

    let child = record("late.txt", Some(&folder));
    ledger.seed(child.clone());
    ledger.replace(with_children(folder.clone(), &[&child]));

    let outcome = engine
        .apply(Notification::Updated {
            hash: folder.content_hash,
            version: 1,
        })
        .await
        .unwrap();
    assert_eq!(outcome.label(), "refreshed");
    let report = outcome.settle().await.unwrap();
    assert_eq!(report.attached, 1);
    assert_eq!(
        engine.lookup(&child.content_hash),
        Some(TreePath::from_offsets(vec![0, 0]))
    );
    assert_eq!(engine.node(&folder.content_hash).unwrap().version, Some(1));

    let replay = engine
        .apply(Notification::Updated {
            hash: folder.content_hash,
            version: 1,
        })
        .await
        .unwrap();
    assert!(matches!(replay, DispatchOutcome::Stale { version: 1, .. }));
}

#[tokio::test]
async fn test_updates_dropped_under_ignore_policy() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("folder", None);
    ledger.seed(folder.clone());
    let engine = engine_with(
        &ledger,
        "viewer",
        SyncConfig {
            update_policy: UpdatePolicy::Ignore,
            ..SyncConfig::default()
        },
    );

    let outcome = engine
        .apply(Notification::Updated {
            hash: folder.content_hash,
            version: 3,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Ignored(_)));
    assert!(engine.is_empty());
    assert_eq!(ledger.fetch_count(&folder.content_hash), 0);
}

#[tokio::test]
async fn test_new_review_attaches_read_only_entry() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("shared", None);
    ledger.seed(folder.clone());
    let proposal = record("proposal.md", Some(&folder));
    ledger.seed_review(proposal.clone(), Identity::new("bob"));
    let engine = engine(&ledger);
    engine.materialize(folder.content_hash).await.unwrap();

    let outcome = engine
        .apply(Notification::NewReview {
            hash: proposal.content_hash,
            proponent: Identity::new("bob"),
        })
        .await
        .unwrap();
    assert_eq!(outcome.label(), "attached");

    let node = engine.node(&proposal.content_hash).unwrap();
    assert!(node.in_review);
    assert!(!node.permissions.allows(Operation::Update));
    assert!(!node.permissions.allows(Operation::Remove));
    let vote = node.review_vote.unwrap();
    assert_eq!(vote.proponent, Identity::new("bob"));
    assert_eq!(vote.voter, Identity::new("viewer"));
    assert_eq!(
        engine.lookup(&proposal.content_hash),
        Some(TreePath::from_offsets(vec![0, 0]))
    );
}

#[tokio::test]
async fn test_removed_folder_revokes_pending_children() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("folder", None);
    let child = record("inside.txt", Some(&folder));
    let folder = with_children(folder, &[&child]);
    ledger.seed(folder.clone());
    ledger.seed(child.clone());
    let gate = ledger.gate_fetch(child.content_hash);
    let engine = engine(&ledger);

    let attached = engine.materialize(folder.content_hash).await.unwrap();
    wait_until(|| ledger.fetch_count(&child.content_hash) == 1).await;

    let removal = engine
        .apply(Notification::Removed {
            hash: folder.content_hash,
        })
        .await
        .unwrap();
    assert!(matches!(removal, DispatchOutcome::Removed { nodes: 1, .. }));

    gate.open();
    let report = attached.subtree.wait().await.unwrap();
    assert_eq!(report.attached, 0);
    assert_eq!(report.revoked, 1);
    assert!(!engine.contains(&child.content_hash));
    assert!(engine.is_empty());
    assert!(engine.verify().is_ok());
}

#[tokio::test]
async fn test_removed_folder_revokes_pending_grandchildren_in_watch_loop() {
    let ledger = Arc::new(MemoryLedger::new());
    let top = record("top", None);
    let inner = record("inner", Some(&top));
    let leaf = record("leaf.txt", Some(&inner));
    let inner = with_children(inner, &[&leaf]);
    let top = with_children(top, &[&inner]);
    for r in [&top, &inner, &leaf] {
        ledger.seed(r.clone());
    }
    let gate = ledger.gate_fetch(leaf.content_hash);
    let engine = engine(&ledger);
    engine.begin_watching().unwrap();

    ledger.publish(Notification::Inserted {
        hash: top.content_hash,
        index: 0,
    });
    wait_until(|| ledger.fetch_count(&leaf.content_hash) == 1).await;
    assert!(engine.contains(&inner.content_hash));

    ledger.publish(Notification::Removed {
        hash: top.content_hash,
    });
    wait_until(|| !engine.contains(&top.content_hash)).await;
    gate.open();

    // Released fetch finishes on its own dispatch task
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(!engine.contains(&leaf.content_hash));
    assert!(engine.is_empty());
    assert!(engine.verify().is_ok());
    engine.stop_watching().await;
}
