//! Shared fixtures for integration tests

use fsmirror::config::SyncConfig;
use fsmirror::remote::{MemoryLedger, Record};
use fsmirror::sync::{Collaborators, SyncEngine};
use fsmirror::types::{ContentHash, Identity};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub fn record(name: &str, parent: Option<&Record>) -> Record {
    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), name.to_string());
    Record::new(parent.map(|p| p.content_hash), metadata)
}

/// Declare `children` on `parent`, in order
pub fn with_children(mut parent: Record, children: &[&Record]) -> Record {
    parent.child_hashes = children.iter().map(|c| c.content_hash).collect();
    parent
}

pub fn engine(ledger: &Arc<MemoryLedger>) -> SyncEngine {
    engine_with(ledger, "viewer", SyncConfig::default())
}

pub fn engine_with(ledger: &Arc<MemoryLedger>, identity: &str, config: SyncConfig) -> SyncEngine {
    SyncEngine::new(
        Collaborators::from_ledger(ledger.clone(), Identity::new(identity)),
        config,
    )
}

/// Poll `condition` until it holds; panics after a couple of seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Small folder tree: root -> [docs -> [a.txt, b.txt], notes.md]
pub struct SampleTree {
    pub root: Record,
    pub docs: Record,
    pub a: Record,
    pub b: Record,
    pub notes: Record,
}

impl SampleTree {
    pub fn new() -> Self {
        let root = record("root", None);
        let docs = record("docs", Some(&root));
        let a = record("a.txt", Some(&docs));
        let b = record("b.txt", Some(&docs));
        let notes = record("notes.md", Some(&root));
        let docs = with_children(docs, &[&a, &b]);
        let root = with_children(root, &[&docs, &notes]);
        Self {
            root,
            docs,
            a,
            b,
            notes,
        }
    }

    pub fn seed(&self, ledger: &MemoryLedger) {
        for r in self.records() {
            ledger.seed(r.clone());
        }
    }

    pub fn records(&self) -> [&Record; 5] {
        [&self.root, &self.docs, &self.a, &self.b, &self.notes]
    }

    pub fn hashes(&self) -> Vec<ContentHash> {
        self.records().iter().map(|r| r.content_hash).collect()
    }
}
