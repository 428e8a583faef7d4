//! Mirrored file/folder node

use crate::permissions::CapabilitySet;
use crate::remote::{Record, VoteState};
use crate::types::{hex_hash, ContentHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One file or folder materialized from the remote store.
///
/// `children` holds positional slots. A detached child leaves `None` behind so the
/// offsets of its later siblings never move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(with = "hex_hash")]
    pub content_hash: ContentHash,
    #[serde(with = "hex_hash::option")]
    pub parent_hash: Option<ContentHash>,
    /// Children declared by the remote record, in declaration order
    #[serde(with = "hex_hash::vec")]
    pub child_hashes: Vec<ContentHash>,
    pub metadata: BTreeMap<String, String>,
    pub permissions: CapabilitySet,
    pub in_review: bool,
    pub review_vote: Option<VoteState>,
    /// Last applied update version
    pub version: Option<u64>,
    /// Insertion sequence number within the mirror
    pub ordinal: u64,
    pub children: Vec<Option<Node>>,
}

impl Node {
    /// Build an accepted node from a fetched record and its resolved capabilities
    pub fn from_record(record: Record, permissions: CapabilitySet) -> Self {
        Self {
            content_hash: record.content_hash,
            parent_hash: record.parent_hash,
            child_hashes: record.child_hashes,
            metadata: record.metadata,
            permissions,
            in_review: false,
            review_vote: None,
            version: None,
            ordinal: 0,
            children: Vec::new(),
        }
    }

    /// Build a provisional node. Review entries are never mutable by the viewer.
    pub fn in_review(record: Record, vote: VoteState) -> Self {
        Self {
            in_review: true,
            review_vote: Some(vote),
            ..Self::from_record(record, CapabilitySet::denied())
        }
    }

    /// Live children with their slot offsets
    pub fn live_children(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.as_ref().map(|n| (offset, n)))
    }

    pub fn live_child_count(&self) -> usize {
        self.children.iter().filter(|slot| slot.is_some()).count()
    }

    /// Copy of this node without its attached subtree
    pub fn detached_copy(&self) -> Node {
        Node {
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// Count of this node plus every attached descendant
    pub fn subtree_size(&self) -> usize {
        1 + self
            .live_children()
            .map(|(_, child)| child.subtree_size())
            .sum::<usize>()
    }

    /// Content hashes of this node and every attached descendant, depth-first
    pub fn subtree_hashes(&self) -> Vec<ContentHash> {
        let mut out = Vec::with_capacity(self.subtree_size());
        self.collect_hashes(&mut out);
        out
    }

    fn collect_hashes(&self, out: &mut Vec<ContentHash>) {
        out.push(self.content_hash);
        for (_, child) in self.live_children() {
            child.collect_hashes(out);
        }
    }
}
