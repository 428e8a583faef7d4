//! Random attach/detach sequences keep the identifier index and the forest in agreement

use fsmirror::permissions::CapabilitySet;
use fsmirror::remote::Record;
use fsmirror::store::{AttachOutcome, MirrorStore};
use fsmirror::tree::node::Node;
use fsmirror::types::ContentHash;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    /// Attach a fresh node under the `n`-th live hash, or at the root when none
    Attach(usize),
    /// Re-attach an already mirrored hash
    Duplicate(usize),
    Detach(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<usize>().prop_map(Op::Attach),
        1 => any::<usize>().prop_map(Op::Duplicate),
        2 => any::<usize>().prop_map(Op::Detach),
    ]
}

fn node(seq: usize) -> Node {
    let mut metadata = BTreeMap::new();
    metadata.insert("seq".to_string(), seq.to_string());
    Node::from_record(Record::new(None, metadata), CapabilitySet::allowed())
}

fn live_hashes(store: &MirrorStore) -> Vec<ContentHash> {
    let mut hashes: Vec<ContentHash> = store.index().iter().map(|(h, _)| *h).collect();
    hashes.sort();
    hashes
}

#[test]
fn test_index_matches_tree_after_random_mutations() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(op_strategy(), 1..60), |ops| {
            let mut store = MirrorStore::new();
            let mut seq = 0usize;

            for op in ops {
                let live = live_hashes(&store);
                match op {
                    Op::Attach(pick) => {
                        let parent = if live.is_empty() || pick % 4 == 0 {
                            None
                        } else {
                            store.lookup(&live[pick % live.len()]).cloned()
                        };
                        seq += 1;
                        let outcome = store.attach(node(seq), parent.as_ref()).unwrap();
                        prop_assert!(matches!(outcome, AttachOutcome::Attached(_)));
                    }
                    Op::Duplicate(pick) => {
                        if live.is_empty() {
                            continue;
                        }
                        let hash = live[pick % live.len()];
                        let existing = store.node(&hash).unwrap().detached_copy();
                        let before = store.len();
                        let outcome = store.attach(existing, None).unwrap();
                        prop_assert!(matches!(outcome, AttachOutcome::AlreadyPresent(_)));
                        prop_assert_eq!(store.len(), before);
                    }
                    Op::Detach(pick) => {
                        if live.is_empty() {
                            continue;
                        }
                        let hash = live[pick % live.len()];
                        let removed = store.detach(&hash).unwrap();
                        for gone in removed.subtree_hashes() {
                            prop_assert!(!store.contains(&gone));
                        }
                        prop_assert!(store.detach(&hash).is_none());
                    }
                }
                prop_assert!(store.verify().is_ok(), "{:?}", store.verify());
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_detach_never_moves_surviving_nodes() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(2usize..12, any::<usize>()), |(count, pick)| {
            let mut store = MirrorStore::new();
            let mut hashes = Vec::new();
            for seq in 0..count {
                let n = node(seq);
                hashes.push(n.content_hash);
                store.attach(n, None).unwrap();
            }
            let before: Vec<_> = hashes
                .iter()
                .map(|h| store.lookup(h).cloned())
                .collect();

            let victim = pick % count;
            store.detach(&hashes[victim]).unwrap();

            for (i, hash) in hashes.iter().enumerate() {
                if i == victim {
                    prop_assert!(store.lookup(hash).is_none());
                } else {
                    prop_assert_eq!(store.lookup(hash).cloned(), before[i].clone());
                }
            }
            Ok(())
        })
        .unwrap();
}
