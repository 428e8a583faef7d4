//! In-process ledger implementing every remote collaborator
//!
//! Backs the CLI fixtures and the test suites. Confirmed transactions are committed
//! to the ledger and published on the change feed, the same way a remote contract
//! emits its events after a block lands.

use super::{
    ChangeFeed, Notification, NotificationKind, NotificationSink, PermissionService, Record,
    RecordStore, SubscriptionId, TransactionHandle, TransactionKind, TransactionReceipt,
    VoteService, VoteState,
};
use crate::error::SyncError;
use crate::permissions::{CapabilityOverride, CapabilitySet};
use crate::types::{hex_hash, short_hash, ContentHash, Identity};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Review record seeded into a fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFixture {
    pub record: Record,
    pub proponent: Identity,
    #[serde(default)]
    pub votes: Vec<VoteState>,
}

/// Per-resource override seeded into a fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideFixture {
    pub identity: Identity,
    #[serde(with = "hex_hash")]
    pub resource: ContentHash,
    pub capabilities: CapabilityOverride,
}

/// JSON description of a ledger's initial contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFixture {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub reviews: Vec<ReviewFixture>,
    #[serde(default)]
    pub base_capabilities: HashMap<Identity, CapabilitySet>,
    /// Applied to identities without an explicit base set
    #[serde(default)]
    pub default_capabilities: Option<CapabilitySet>,
    #[serde(default)]
    pub overrides: Vec<OverrideFixture>,
}

/// Blocks fetches of one hash until opened
#[derive(Clone)]
pub struct FetchGate {
    semaphore: Arc<Semaphore>,
}

impl FetchGate {
    const RELEASE_PERMITS: usize = 1 << 16;

    pub fn open(&self) {
        self.semaphore.add_permits(Self::RELEASE_PERMITS);
    }
}

#[derive(Default)]
struct LedgerState {
    records: HashMap<ContentHash, Record>,
    order: Vec<ContentHash>,
    reviews: HashMap<(ContentHash, Identity), Record>,
    votes: HashMap<(ContentHash, Identity, Identity), VoteState>,
    base_capabilities: HashMap<Identity, CapabilitySet>,
    default_capabilities: Option<CapabilitySet>,
    overrides: HashMap<(Identity, ContentHash), CapabilityOverride>,
    subscribers: HashMap<SubscriptionId, (NotificationKind, NotificationSink)>,
    next_subscription: u64,
    pending: HashMap<ContentHash, PendingTx>,
    next_tx: u64,
    reject_transactions: bool,
    failing: HashSet<ContentHash>,
    gates: HashMap<ContentHash, Arc<Semaphore>>,
    fetches: HashMap<ContentHash, usize>,
}

enum PendingTx {
    Insert(Record),
    Remove(ContentHash),
}

/// In-memory ledger
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: LedgerFixture) -> Self {
        let ledger = Self::new();
        for record in fixture.records {
            ledger.seed(record);
        }
        for review in fixture.reviews {
            let hash = review.record.content_hash;
            ledger.seed_review(review.record, review.proponent);
            for vote in review.votes {
                ledger.set_vote(hash, vote);
            }
        }
        {
            let mut state = ledger.state.lock();
            state.base_capabilities = fixture.base_capabilities;
            state.default_capabilities = fixture.default_capabilities;
        }
        for o in fixture.overrides {
            ledger.set_override(o.identity, o.resource, o.capabilities);
        }
        ledger
    }

    /// Load a JSON fixture file
    pub fn load_fixture(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigError(format!("Failed to read ledger fixture {:?}: {}", path, e))
        })?;
        let fixture: LedgerFixture = serde_json::from_str(&raw).map_err(|e| {
            SyncError::ConfigError(format!("Failed to parse ledger fixture {:?}: {}", path, e))
        })?;
        info!(
            records = fixture.records.len(),
            reviews = fixture.reviews.len(),
            "Loaded ledger fixture"
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Add an accepted record without publishing a notification
    pub fn seed(&self, record: Record) {
        let mut state = self.state.lock();
        if !state.records.contains_key(&record.content_hash) {
            state.order.push(record.content_hash);
        }
        state.records.insert(record.content_hash, record);
    }

    pub fn seed_review(&self, record: Record, proponent: Identity) {
        let mut state = self.state.lock();
        state
            .reviews
            .insert((record.content_hash, proponent), record);
    }

    pub fn set_vote(&self, resource: ContentHash, vote: VoteState) {
        let mut state = self.state.lock();
        state
            .votes
            .insert((resource, vote.proponent.clone(), vote.voter.clone()), vote);
    }

    /// Replace a stored record in place (e.g. to simulate a remote update)
    pub fn replace(&self, record: Record) {
        self.state.lock().records.insert(record.content_hash, record);
    }

    pub fn set_base_capabilities(&self, identity: Identity, capabilities: CapabilitySet) {
        self.state
            .lock()
            .base_capabilities
            .insert(identity, capabilities);
    }

    pub fn set_default_capabilities(&self, capabilities: CapabilitySet) {
        self.state.lock().default_capabilities = Some(capabilities);
    }

    pub fn set_override(
        &self,
        identity: Identity,
        resource: ContentHash,
        capabilities: CapabilityOverride,
    ) {
        self.state
            .lock()
            .overrides
            .insert((identity, resource), capabilities);
    }

    /// Make every subsequent transaction fail confirmation
    pub fn reject_transactions(&self, reject: bool) {
        self.state.lock().reject_transactions = reject;
    }

    /// Make fetches of `hash` fail with a remote error
    pub fn fail_fetches(&self, hash: ContentHash) {
        self.state.lock().failing.insert(hash);
    }

    /// Hold fetches of `hash` until the returned gate is opened
    pub fn gate_fetch(&self, hash: ContentHash) -> FetchGate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.state.lock().gates.insert(hash, Arc::clone(&semaphore));
        FetchGate { semaphore }
    }

    /// Number of accepted/review fetches served for `hash`
    pub fn fetch_count(&self, hash: &ContentHash) -> usize {
        self.state.lock().fetches.get(hash).copied().unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.state.lock().records.contains_key(hash)
    }

    /// Deliver a notification to every subscriber of its kind
    pub fn publish(&self, notification: Notification) -> usize {
        let mut state = self.state.lock();
        let kind = notification.kind();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, (sub_kind, sink)) in state.subscribers.iter() {
            if *sub_kind != kind {
                continue;
            }
            if sink.send(notification.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            state.subscribers.remove(&id);
        }
        debug!(
            ?kind,
            hash = %short_hash(notification.hash()),
            delivered,
            "Published notification"
        );
        delivered
    }

    async fn pass_gate(&self, hash: &ContentHash) -> Result<(), SyncError> {
        let gate = {
            let mut state = self.state.lock();
            *state.fetches.entry(*hash).or_insert(0) += 1;
            if state.failing.contains(hash) {
                return Err(SyncError::Remote(format!(
                    "fetch of {} failed",
                    short_hash(hash)
                )));
            }
            state.gates.get(hash).cloned()
        };
        if let Some(semaphore) = gate {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| SyncError::Remote(format!("fetch gate closed: {}", e)))?;
        }
        Ok(())
    }

    fn next_tx_id(state: &mut LedgerState, target: &ContentHash) -> ContentHash {
        state.next_tx += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&state.next_tx.to_le_bytes());
        hasher.update(target);
        *hasher.finalize().as_bytes()
    }

    /// Apply a confirmed transaction and return the notification it produces
    fn commit(state: &mut LedgerState, tx: PendingTx) -> Option<Notification> {
        match tx {
            PendingTx::Insert(record) => {
                let hash = record.content_hash;
                if state.records.contains_key(&hash) {
                    return None;
                }
                if let Some(parent) = record.parent_hash {
                    if let Some(parent_record) = state.records.get_mut(&parent) {
                        parent_record.child_hashes.push(hash);
                    }
                }
                state.records.insert(hash, record);
                state.order.push(hash);
                Some(Notification::Inserted {
                    hash,
                    index: (state.order.len() - 1) as u64,
                })
            }
            PendingTx::Remove(hash) => {
                let record = state.records.remove(&hash)?;
                state.order.retain(|h| *h != hash);
                if let Some(parent) = record.parent_hash {
                    if let Some(parent_record) = state.records.get_mut(&parent) {
                        parent_record.child_hashes.retain(|h| *h != hash);
                    }
                }
                Some(Notification::Removed { hash })
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryLedger {
    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Record, SyncError> {
        self.pass_gate(hash).await?;
        self.state
            .lock()
            .records
            .get(hash)
            .cloned()
            .ok_or(SyncError::NotFound(*hash))
    }

    async fn get_in_review(
        &self,
        hash: &ContentHash,
        proponent: &Identity,
    ) -> Result<Record, SyncError> {
        self.pass_gate(hash).await?;
        self.state
            .lock()
            .reviews
            .get(&(*hash, proponent.clone()))
            .cloned()
            .ok_or(SyncError::NotFound(*hash))
    }

    async fn count(&self) -> Result<u64, SyncError> {
        Ok(self.state.lock().order.len() as u64)
    }

    async fn type_index(&self, index: u64) -> Result<ContentHash, SyncError> {
        let state = self.state.lock();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.order.get(i).copied())
            .ok_or_else(|| SyncError::Remote(format!("type index {} out of range", index)))
    }

    async fn submit_insert(&self, record: Record) -> Result<TransactionHandle, SyncError> {
        let mut state = self.state.lock();
        let target = record.content_hash;
        let tx_id = Self::next_tx_id(&mut state, &target);
        state.pending.insert(tx_id, PendingTx::Insert(record));
        debug!(target = %short_hash(&target), "Submitted insert transaction");
        Ok(TransactionHandle {
            tx_id,
            kind: TransactionKind::Insert,
            target,
        })
    }

    async fn submit_remove(&self, hash: &ContentHash) -> Result<TransactionHandle, SyncError> {
        let mut state = self.state.lock();
        let tx_id = Self::next_tx_id(&mut state, hash);
        state.pending.insert(tx_id, PendingTx::Remove(*hash));
        debug!(target = %short_hash(hash), "Submitted remove transaction");
        Ok(TransactionHandle {
            tx_id,
            kind: TransactionKind::Remove,
            target: *hash,
        })
    }

    async fn await_confirmations(
        &self,
        tx: &TransactionHandle,
        confirmations: u32,
    ) -> Result<TransactionReceipt, SyncError> {
        let notification = {
            let mut state = self.state.lock();
            let pending = state.pending.remove(&tx.tx_id).ok_or_else(|| {
                SyncError::TransactionRejected(format!(
                    "unknown transaction {}",
                    short_hash(&tx.tx_id)
                ))
            })?;
            if state.reject_transactions {
                warn!(tx = %short_hash(&tx.tx_id), "Transaction reverted");
                return Ok(TransactionReceipt {
                    tx_id: tx.tx_id,
                    confirmations: 0,
                    success: false,
                    confirmed_at: chrono::Utc::now(),
                });
            }
            Self::commit(&mut state, pending)
        };
        if let Some(notification) = notification {
            self.publish(notification);
        }
        Ok(TransactionReceipt {
            tx_id: tx.tx_id,
            confirmations,
            success: true,
            confirmed_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl PermissionService for MemoryLedger {
    async fn get_base_capabilities(&self, identity: &Identity) -> Result<CapabilitySet, SyncError> {
        let state = self.state.lock();
        Ok(state
            .base_capabilities
            .get(identity)
            .copied()
            .or(state.default_capabilities)
            .unwrap_or_else(CapabilitySet::allowed))
    }

    async fn get_override(
        &self,
        identity: &Identity,
        resource: &ContentHash,
    ) -> Result<Option<CapabilityOverride>, SyncError> {
        Ok(self
            .state
            .lock()
            .overrides
            .get(&(identity.clone(), *resource))
            .copied())
    }
}

#[async_trait]
impl VoteService for MemoryLedger {
    async fn get_vote(
        &self,
        resource: &ContentHash,
        proponent: &Identity,
        voter: &Identity,
    ) -> Result<VoteState, SyncError> {
        let state = self.state.lock();
        Ok(state
            .votes
            .get(&(*resource, proponent.clone(), voter.clone()))
            .cloned()
            .unwrap_or_else(|| VoteState {
                proponent: proponent.clone(),
                voter: voter.clone(),
                ..Default::default()
            }))
    }
}

impl ChangeFeed for MemoryLedger {
    fn subscribe(&self, kind: NotificationKind, sink: NotificationSink) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.subscribers.insert(id, (kind, sink));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().subscribers.remove(&id).is_some()
    }
}
