//! Positional paths into the mirrored forest

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence of child offsets from the forest's top-level sequence down to a node.
///
/// A root-level node has a single-element path holding its position in the forest;
/// every further element is a slot offset within the parent's children. The path
/// length is therefore the node's depth, counting roots as depth 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    /// Path of a root-level node at the given forest offset
    pub fn root(offset: usize) -> Self {
        TreePath(vec![offset])
    }

    pub fn from_offsets(offsets: Vec<usize>) -> Self {
        TreePath(offsets)
    }

    /// Path of the child at `offset` under this path
    pub fn child(&self, offset: usize) -> Self {
        let mut offsets = Vec::with_capacity(self.0.len() + 1);
        offsets.extend_from_slice(&self.0);
        offsets.push(offset);
        TreePath(offsets)
    }

    /// Parent path; `None` for root-level (and empty) paths
    pub fn parent(&self) -> Option<TreePath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(TreePath(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.0
    }

    /// Offset of the addressed node within its own sibling sequence
    pub fn last_offset(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// True when `other` is this path or lies underneath it
    pub fn is_ancestor_of_or_equal(&self, other: &TreePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for offset in &self.0 {
            write!(f, "/{}", offset)?;
        }
        Ok(())
    }
}
