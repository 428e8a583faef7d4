//! Mirrored Forest
//!
//! Ordered forest of file/folder nodes. Sibling order is insertion order at the
//! parent. Every structural operation walks a single root-to-node path, so reads and
//! mutations are O(depth) with no global re-scan.

pub mod node;
pub mod path;

use crate::error::TreeError;
use node::Node;
use path::TreePath;
use serde::{Deserialize, Serialize};

/// Ordered forest of mirrored nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    roots: Vec<Option<Node>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `node` under `parent` (or to the forest top level when `None`).
    ///
    /// Returns the slot offset assigned to the node. Offsets are never reused: a
    /// detached slot stays empty and new nodes always go after the last slot.
    pub fn attach(&mut self, node: Node, parent: Option<&TreePath>) -> Result<usize, TreeError> {
        let slots = match parent {
            None => &mut self.roots,
            Some(parent_path) => match self.get_mut(parent_path) {
                Some(parent_node) => &mut parent_node.children,
                None => return Err(TreeError::ParentNotFound(parent_path.clone())),
            },
        };
        slots.push(Some(node));
        Ok(slots.len() - 1)
    }

    /// Remove the node at `path` together with its whole subtree.
    ///
    /// The slot is left empty rather than compacted so that sibling paths stay valid.
    pub fn detach(&mut self, path: &TreePath) -> Result<Node, TreeError> {
        let offset = path
            .last_offset()
            .ok_or_else(|| TreeError::PathNotFound(path.clone()))?;
        let slots = match path.parent() {
            None => &mut self.roots,
            Some(parent_path) => match self.get_mut(&parent_path) {
                Some(parent_node) => &mut parent_node.children,
                None => return Err(TreeError::PathNotFound(path.clone())),
            },
        };
        slots
            .get_mut(offset)
            .and_then(Option::take)
            .ok_or_else(|| TreeError::PathNotFound(path.clone()))
    }

    /// Node at `path`, if a live node occupies that position
    pub fn get(&self, path: &TreePath) -> Option<&Node> {
        let (first, rest) = path.offsets().split_first()?;
        let mut node = self.roots.get(*first)?.as_ref()?;
        for offset in rest {
            node = node.children.get(*offset)?.as_ref()?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &TreePath) -> Option<&mut Node> {
        let (first, rest) = path.offsets().split_first()?;
        let mut node = self.roots.get_mut(*first)?.as_mut()?;
        for offset in rest {
            node = node.children.get_mut(*offset)?.as_mut()?;
        }
        Some(node)
    }

    /// Live root-level nodes with their forest offsets
    pub fn roots(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.as_ref().map(|n| (offset, n)))
    }

    /// Number of root slots, including gaps
    pub fn root_slot_count(&self) -> usize {
        self.roots.len()
    }

    /// Depth-first walk over every live node, in sibling order
    pub fn walk(&self) -> Vec<(TreePath, &Node)> {
        let mut out = Vec::new();
        for (offset, root) in self.roots() {
            Self::walk_from(TreePath::root(offset), root, &mut out);
        }
        out
    }

    fn walk_from<'a>(path: TreePath, node: &'a Node, out: &mut Vec<(TreePath, &'a Node)>) {
        let children: Vec<(usize, &'a Node)> = node.live_children().collect();
        out.push((path.clone(), node));
        for (offset, child) in children {
            Self::walk_from(path.child(offset), child, out);
        }
    }

    /// Total count of live nodes
    pub fn len(&self) -> usize {
        self.roots().map(|(_, n)| n.subtree_size()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots().next().is_none()
    }
}
