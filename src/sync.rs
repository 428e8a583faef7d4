//! Synchronization Engine
//!
//! `SyncEngine` owns the mirror (forest + identifier index) and keeps it in step with
//! the remote store: recursive materialization of records, review entries, change
//! notification dispatch, and the insert/remove transactions offered to the UI layer.
//!
//! The engine is an explicitly constructed value; clones share the same mirror.

pub mod events;
pub mod materialize;
pub mod runtime;

pub use events::{DispatchOutcome, UpdatePolicy};
pub use materialize::{
    LoadReport, MaterializeFailure, MaterializeOutcome, Materialized, SubtreeHandle,
    SubtreeReport,
};

use crate::concurrency::InflightTracker;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::permissions::{CapabilitySet, Operation, PermissionResolver};
use crate::remote::{
    ChangeFeed, IdentityProvider, MemoryLedger, PermissionService, Record, RecordStore,
    StaticIdentity, TransactionHandle, TransactionReceipt, VoteService,
};
use crate::store::{IndexEntry, MirrorStore};
use crate::tree::node::Node;
use crate::tree::path::TreePath;
use crate::tree::Tree;
use crate::types::{short_hash, ContentHash, Identity};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// External collaborators the engine calls into
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub permissions: Arc<dyn PermissionService>,
    pub votes: Arc<dyn VoteService>,
    pub feed: Arc<dyn ChangeFeed>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Collaborators {
    /// Wire every collaborator to one in-process ledger
    pub fn from_ledger(ledger: Arc<MemoryLedger>, identity: Identity) -> Self {
        Self {
            records: ledger.clone(),
            permissions: ledger.clone(),
            votes: ledger.clone(),
            feed: ledger,
            identity: Arc::new(StaticIdentity(identity)),
        }
    }
}

pub(crate) struct EngineInner {
    store: RwLock<MirrorStore>,
    records: Arc<dyn RecordStore>,
    votes: Arc<dyn VoteService>,
    feed: Arc<dyn ChangeFeed>,
    identity: Arc<dyn IdentityProvider>,
    permissions: PermissionResolver,
    inflight: InflightTracker,
    config: SyncConfig,
    watcher: Mutex<Option<runtime::WatchState>>,
}

/// Tree-synchronization engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(collaborators: Collaborators, config: SyncConfig) -> Self {
        let Collaborators {
            records,
            permissions,
            votes,
            feed,
            identity,
        } = collaborators;
        Self {
            inner: Arc::new(EngineInner {
                store: RwLock::new(MirrorStore::new()),
                records,
                votes,
                feed,
                identity,
                permissions: PermissionResolver::new(permissions),
                inflight: InflightTracker::new(),
                config,
                watcher: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> Identity {
        self.inner.identity.current_identity()
    }

    /// Re-fetch and cache the acting identity's base capability set
    pub async fn refresh_base_capabilities(&self) -> Result<CapabilitySet, SyncError> {
        let identity = self.identity();
        self.inner.permissions.refresh_base(&identity).await
    }

    /// Clone of the current forest
    pub fn snapshot(&self) -> Tree {
        self.inner.store.read().tree().clone()
    }

    pub fn lookup(&self, hash: &ContentHash) -> Option<TreePath> {
        self.inner.store.read().lookup(hash).cloned()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.inner.store.read().contains(hash)
    }

    /// Copy of the node for `hash`, without its subtree
    pub fn node(&self, hash: &ContentHash) -> Option<Node> {
        self.inner.store.read().node(hash).map(Node::detached_copy)
    }

    pub fn node_at(&self, path: &TreePath) -> Option<Node> {
        self.inner.store.read().tree().get(path).map(Node::detached_copy)
    }

    /// Number of indexed nodes
    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    pub fn index_entries(&self) -> Vec<IndexEntry> {
        self.inner.store.read().index_entries()
    }

    /// Run the Index/Tree consistency check
    pub fn verify(&self) -> Result<(), Vec<String>> {
        self.inner.store.read().verify()
    }

    /// Submit an insert transaction and wait for the configured confirmations.
    ///
    /// The mirror is not touched here; the resulting `Inserted` notification is.
    #[instrument(skip(self, record), fields(hash = %short_hash(&record.content_hash)))]
    pub async fn insert(&self, record: Record) -> Result<TransactionReceipt, SyncError> {
        if let Some(parent) = record.parent_hash {
            self.ensure_allowed(&parent, Operation::Insert)?;
        }
        let handle = self
            .inner
            .records
            .submit_insert(record)
            .await
            .map_err(|e| SyncError::TransactionRejected(e.to_string()))?;
        self.confirm(handle).await
    }

    /// Submit a remove transaction and wait for the configured confirmations
    #[instrument(skip(self), fields(hash = %short_hash(&hash)))]
    pub async fn remove(&self, hash: ContentHash) -> Result<TransactionReceipt, SyncError> {
        self.ensure_allowed(&hash, Operation::Remove)?;
        let handle = self
            .inner
            .records
            .submit_remove(&hash)
            .await
            .map_err(|e| SyncError::TransactionRejected(e.to_string()))?;
        self.confirm(handle).await
    }

    /// Refuse the action when `hash` is mirrored and its resolved capability denies `op`.
    /// Hashes outside the mirror are left for the remote side to judge.
    fn ensure_allowed(&self, hash: &ContentHash, op: Operation) -> Result<(), SyncError> {
        let permissions = self.inner.store.read().node(hash).map(|n| n.permissions);
        match permissions {
            Some(caps) if !caps.allows(op) => Err(SyncError::Unauthorized(format!(
                "{} may not {:?} on {}",
                self.identity(),
                op,
                short_hash(hash)
            ))),
            _ => Ok(()),
        }
    }

    async fn confirm(&self, handle: TransactionHandle) -> Result<TransactionReceipt, SyncError> {
        let required = self.inner.config.confirmations;
        let receipt = self
            .inner
            .records
            .await_confirmations(&handle, required)
            .await
            .map_err(|e| SyncError::TransactionRejected(e.to_string()))?;
        if !receipt.success || receipt.confirmations < required {
            warn!(
                tx = %short_hash(&handle.tx_id),
                confirmations = receipt.confirmations,
                required,
                "Transaction not confirmed"
            );
            return Err(SyncError::TransactionRejected(format!(
                "{:?} of {} reached {}/{} confirmations",
                handle.kind,
                short_hash(&handle.target),
                receipt.confirmations,
                required
            )));
        }
        info!(
            tx = %short_hash(&handle.tx_id),
            kind = ?handle.kind,
            confirmations = receipt.confirmations,
            "Transaction confirmed"
        );
        Ok(receipt)
    }
}
