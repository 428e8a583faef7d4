//! Mirror Store
//!
//! Owns the mirrored forest together with its identifier index. Every mutation goes
//! through here so that a hash is registered exactly where its node sits, and a
//! detached subtree leaves no index entries behind.

pub mod index;

pub use index::IdentifierIndex;

use crate::error::TreeError;
use crate::tree::node::Node;
use crate::tree::path::TreePath;
use crate::tree::Tree;
use crate::types::{short_hash, ContentHash};
use serde::Serialize;

/// Result of [`MirrorStore::attach`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(TreePath),
    /// The hash was already indexed; nothing was attached
    AlreadyPresent(TreePath),
}

/// One row of an index dump
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub hash: String,
    pub path: TreePath,
    pub depth: usize,
}

/// Tree + Index pair
#[derive(Debug, Default, Clone)]
pub struct MirrorStore {
    tree: Tree,
    index: IdentifierIndex,
    next_ordinal: u64,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `node` under the node at `parent` (forest root when `None`) and register it.
    ///
    /// The dedup check runs here, under whatever lock the caller holds over the store,
    /// so two racing materializations of the same hash attach at most once.
    pub fn attach(
        &mut self,
        mut node: Node,
        parent: Option<&TreePath>,
    ) -> Result<AttachOutcome, TreeError> {
        if let Some(existing) = self.index.lookup(&node.content_hash) {
            return Ok(AttachOutcome::AlreadyPresent(existing.clone()));
        }
        let hash = node.content_hash;
        node.ordinal = self.next_ordinal;
        let offset = self.tree.attach(node, parent)?;
        self.next_ordinal += 1;
        let path = match parent {
            Some(parent_path) => parent_path.child(offset),
            None => TreePath::root(offset),
        };
        self.index.register(hash, path.clone());
        Ok(AttachOutcome::Attached(path))
    }

    /// Detach the node for `hash` with its subtree, unregistering every removed hash.
    ///
    /// Returns `None` when the hash is not indexed.
    pub fn detach(&mut self, hash: &ContentHash) -> Option<Node> {
        let path = self.index.lookup(hash)?.clone();
        match self.tree.detach(&path) {
            Ok(removed) => {
                for removed_hash in removed.subtree_hashes() {
                    self.index.unregister(&removed_hash);
                }
                Some(removed)
            }
            Err(err) => {
                // Index pointed at an empty slot; drop the stale entry.
                tracing::warn!(hash = %short_hash(hash), error = %err, "Stale index entry");
                self.index.unregister(hash);
                None
            }
        }
    }

    pub fn lookup(&self, hash: &ContentHash) -> Option<&TreePath> {
        self.index.lookup(hash)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.index.contains(hash)
    }

    pub fn node(&self, hash: &ContentHash) -> Option<&Node> {
        let path = self.index.lookup(hash)?;
        self.tree.get(path)
    }

    pub fn node_mut(&mut self, hash: &ContentHash) -> Option<&mut Node> {
        let path = self.index.lookup(hash)?.clone();
        self.tree.get_mut(&path)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn index(&self) -> &IdentifierIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Index rows sorted by path
    pub fn index_entries(&self) -> Vec<IndexEntry> {
        let mut entries: Vec<IndexEntry> = self
            .index
            .iter()
            .map(|(hash, path)| IndexEntry {
                hash: hex::encode(hash),
                path: path.clone(),
                depth: path.depth(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Check that Index and Tree agree in both directions.
    ///
    /// Returns every violation found rather than stopping at the first one.
    pub fn verify(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        for (hash, path) in self.index.iter() {
            match self.tree.get(path) {
                Some(node) if node.content_hash == *hash => {}
                Some(node) => violations.push(format!(
                    "index maps {} to {} but that slot holds {}",
                    short_hash(hash),
                    path,
                    short_hash(&node.content_hash)
                )),
                None => violations.push(format!(
                    "index maps {} to {} but no node is there",
                    short_hash(hash),
                    path
                )),
            }
        }

        let walked = self.tree.walk();
        for (path, node) in &walked {
            match self.index.lookup(&node.content_hash) {
                Some(indexed) if indexed == path => {}
                Some(indexed) => violations.push(format!(
                    "node {} sits at {} but is indexed at {}",
                    short_hash(&node.content_hash),
                    path,
                    indexed
                )),
                None => violations.push(format!(
                    "node {} at {} is not indexed",
                    short_hash(&node.content_hash),
                    path
                )),
            }
        }

        if walked.len() != self.index.len() {
            violations.push(format!(
                "tree holds {} nodes but index holds {} entries",
                walked.len(),
                self.index.len()
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
