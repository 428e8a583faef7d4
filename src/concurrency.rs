//! In-flight materialization tracking
//!
//! Materializations suspend at fetch boundaries, so a `Removed(hash)` can be
//! processed while an earlier `Inserted(hash)` is still waiting on its record. Each
//! materialization takes a ticket for its hash; removal revokes every ticket issued
//! so far, and a revoked materialization must not attach its node.
//!
//! Children fanned out from a folder carry the folder's ticket in their [`Lineage`],
//! so removing the folder also revokes descendants whose fetches are still pending.

use crate::types::ContentHash;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct InflightEntry {
    active: usize,
    next_seq: u64,
    /// Tickets with a sequence below this value are revoked
    revoked_before: u64,
}

/// Per-hash in-flight ticket registry
#[derive(Debug, Default)]
pub struct InflightTracker {
    entries: Arc<Mutex<HashMap<ContentHash, InflightEntry>>>,
}

/// Ticket held for the duration of one materialization
#[derive(Debug)]
pub struct InflightGuard {
    hash: ContentHash,
    seq: u64,
    entries: Arc<Mutex<HashMap<ContentHash, InflightEntry>>>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a ticket for `hash`
    pub fn begin(&self, hash: ContentHash) -> InflightGuard {
        let mut entries = self.entries.lock();
        let entry = entries.entry(hash).or_default();
        let seq = entry.next_seq;
        entry.next_seq += 1;
        entry.active += 1;
        InflightGuard {
            hash,
            seq,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Revoke every ticket issued for `hash` so far. Returns how many were active.
    pub fn revoke(&self, hash: &ContentHash) -> usize {
        let mut entries = self.entries.lock();
        match entries.get_mut(hash) {
            Some(entry) => {
                entry.revoked_before = entry.next_seq;
                entry.active
            }
            None => 0,
        }
    }

    pub fn is_revoked(&self, guard: &InflightGuard) -> bool {
        guard.is_revoked()
    }

    /// Number of materializations currently holding a ticket for `hash`
    pub fn active(&self, hash: &ContentHash) -> usize {
        self.entries.lock().get(hash).map(|e| e.active).unwrap_or(0)
    }
}

impl InflightGuard {
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub fn is_revoked(&self) -> bool {
        self.entries
            .lock()
            .get(&self.hash)
            .map(|e| self.seq < e.revoked_before)
            .unwrap_or(false)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.hash) {
            entry.active = entry.active.saturating_sub(1);
            if entry.active == 0 {
                entries.remove(&self.hash);
            }
        }
    }
}

/// Tickets of one materialization and of every ancestor that declared it
#[derive(Debug, Clone)]
pub struct Lineage {
    tickets: Vec<Arc<InflightGuard>>,
}

impl Lineage {
    /// Lineage of a top-level materialization
    pub fn new(ticket: InflightGuard) -> Self {
        Self {
            tickets: vec![Arc::new(ticket)],
        }
    }

    /// Lineage of a declared child, keeping every ancestor ticket alive
    pub fn child(&self, ticket: InflightGuard) -> Self {
        let mut tickets = self.tickets.clone();
        tickets.push(Arc::new(ticket));
        Self { tickets }
    }

    /// Revoked when the node's own ticket or any ancestor ticket is revoked
    pub fn is_revoked(&self) -> bool {
        self.tickets.iter().any(|ticket| ticket.is_revoked())
    }

    /// Hash this lineage materializes
    pub fn hash(&self) -> Option<&ContentHash> {
        self.tickets.last().map(|ticket| ticket.hash())
    }

    pub fn depth(&self) -> usize {
        self.tickets.len()
    }
}
