//! Remote Store Collaborators
//!
//! Contracts the synchronization engine consumes: the content-addressed record store
//! (with its transaction surface), the permission and voting services, the
//! change-notification feed and the session identity. `memory` provides an
//! in-process ledger implementing all of them.

pub mod memory;

pub use memory::{FetchGate, LedgerFixture, MemoryLedger};

use crate::error::SyncError;
use crate::permissions::{CapabilityOverride, CapabilitySet};
use crate::types::{hex_hash, ContentHash, Identity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

/// Record as stored in the remote ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "hex_hash")]
    pub content_hash: ContentHash,
    #[serde(default, with = "hex_hash::option")]
    pub parent_hash: Option<ContentHash>,
    #[serde(default, with = "hex_hash::vec")]
    pub child_hashes: Vec<ContentHash>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Record {
    /// New record whose content hash is derived from its parent and metadata
    pub fn new(parent_hash: Option<ContentHash>, metadata: BTreeMap<String, String>) -> Self {
        let content_hash = compute_content_hash(parent_hash.as_ref(), &metadata);
        Self {
            content_hash,
            parent_hash,
            child_hashes: Vec::new(),
            metadata,
        }
    }
}

/// BLAKE3 over a canonical JSON encoding of `(parent, metadata)`
pub fn compute_content_hash(
    parent_hash: Option<&ContentHash>,
    metadata: &BTreeMap<String, String>,
) -> ContentHash {
    let canonical = serde_json::json!({
        "parent": parent_hash.map(hex::encode),
        "metadata": metadata,
    });
    let mut hasher = blake3::Hasher::new();
    hasher.update(canonical.to_string().as_bytes());
    *hasher.finalize().as_bytes()
}

/// Voting state of a provisional record, as seen by one voter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteState {
    pub proponent: Identity,
    pub voter: Identity,
    #[serde(default)]
    pub approvals: u64,
    #[serde(default)]
    pub rejections: u64,
    /// Whether `voter` has already voted
    #[serde(default)]
    pub voted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Insert,
    Remove,
}

/// Handle to a submitted, not yet confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    #[serde(with = "hex_hash")]
    pub tx_id: ContentHash,
    pub kind: TransactionKind,
    #[serde(with = "hex_hash")]
    pub target: ContentHash,
}

/// Outcome of waiting for a transaction's confirmations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    #[serde(with = "hex_hash")]
    pub tx_id: ContentHash,
    pub confirmations: u32,
    pub success: bool,
    pub confirmed_at: DateTime<Utc>,
}

/// Change notification delivered by the remote feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Inserted {
        #[serde(with = "hex_hash")]
        hash: ContentHash,
        #[serde(default)]
        index: u64,
    },
    Updated {
        #[serde(with = "hex_hash")]
        hash: ContentHash,
        version: u64,
    },
    Removed {
        #[serde(with = "hex_hash")]
        hash: ContentHash,
    },
    NewReview {
        #[serde(with = "hex_hash")]
        hash: ContentHash,
        proponent: Identity,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Inserted { .. } => NotificationKind::Inserted,
            Notification::Updated { .. } => NotificationKind::Updated,
            Notification::Removed { .. } => NotificationKind::Removed,
            Notification::NewReview { .. } => NotificationKind::Review,
        }
    }

    pub fn hash(&self) -> &ContentHash {
        match self {
            Notification::Inserted { hash, .. }
            | Notification::Updated { hash, .. }
            | Notification::Removed { hash }
            | Notification::NewReview { hash, .. } => hash,
        }
    }
}

/// Subscribable notification stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Inserted,
    Updated,
    Removed,
    Review,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Inserted,
        NotificationKind::Updated,
        NotificationKind::Removed,
        NotificationKind::Review,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

pub type NotificationSink = UnboundedSender<Notification>;

/// Content-addressed record store with its transaction surface
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch an accepted record. Fails with `SyncError::NotFound` when absent.
    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Record, SyncError>;

    /// Fetch a provisional record proposed by `proponent`
    async fn get_in_review(
        &self,
        hash: &ContentHash,
        proponent: &Identity,
    ) -> Result<Record, SyncError>;

    /// Number of records available for full-corpus enumeration
    async fn count(&self) -> Result<u64, SyncError>;

    /// Content hash of the `index`-th enumerated record
    async fn type_index(&self, index: u64) -> Result<ContentHash, SyncError>;

    async fn submit_insert(&self, record: Record) -> Result<TransactionHandle, SyncError>;

    async fn submit_remove(&self, hash: &ContentHash) -> Result<TransactionHandle, SyncError>;

    /// Wait until `tx` has `confirmations` confirmations (or fails)
    async fn await_confirmations(
        &self,
        tx: &TransactionHandle,
        confirmations: u32,
    ) -> Result<TransactionReceipt, SyncError>;
}

/// Source of base capability sets and per-resource overrides
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn get_base_capabilities(&self, identity: &Identity) -> Result<CapabilitySet, SyncError>;

    async fn get_override(
        &self,
        identity: &Identity,
        resource: &ContentHash,
    ) -> Result<Option<CapabilityOverride>, SyncError>;
}

/// Voting/review service for provisional records
#[async_trait]
pub trait VoteService: Send + Sync {
    async fn get_vote(
        &self,
        resource: &ContentHash,
        proponent: &Identity,
        voter: &Identity,
    ) -> Result<VoteState, SyncError>;
}

/// Change-notification stream, subscribable per notification kind
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, kind: NotificationKind, sink: NotificationSink) -> SubscriptionId;

    /// Returns false when the subscription was unknown
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Exposes the acting identity used for permission resolution
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Identity;
}

/// Fixed session identity
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Identity {
        self.0.clone()
    }
}
