//! Identifier Index
//!
//! Maps content hashes to their current position in the mirrored forest.

use crate::tree::path::TreePath;
use crate::types::ContentHash;
use std::collections::HashMap;

/// In-memory `ContentHash -> TreePath` index
#[derive(Debug, Default, Clone)]
pub struct IdentifierIndex {
    paths: HashMap<ContentHash, TreePath>,
}

impl IdentifierIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of `hash`, O(1)
    pub fn lookup(&self, hash: &ContentHash) -> Option<&TreePath> {
        self.paths.get(hash)
    }

    /// Register `hash` at `path`.
    ///
    /// Refused (returns false, index unchanged) when the hash is already registered.
    pub fn register(&mut self, hash: ContentHash, path: TreePath) -> bool {
        if self.paths.contains_key(&hash) {
            return false;
        }
        self.paths.insert(hash, path);
        true
    }

    pub fn unregister(&mut self, hash: &ContentHash) -> Option<TreePath> {
        self.paths.remove(hash)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.paths.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &TreePath)> {
        self.paths.iter()
    }
}
