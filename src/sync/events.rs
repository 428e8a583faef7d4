//! Event Synchronizer dispatch
//!
//! Translates one change notification into a materializer or mutator call.

use super::materialize::{Materialized, MaterializeOutcome, SubtreeHandle, SubtreeReport};
use super::SyncEngine;
use crate::concurrency::{InflightGuard, Lineage};
use crate::error::SyncError;
use crate::types::{short_hash, ContentHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

pub use crate::remote::Notification;

/// What to do with `Updated` notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Refetch newer versions and update the mirrored node in place
    #[default]
    Refresh,
    /// Drop updates
    Ignore,
}

/// Effect of dispatching one notification
#[derive(Debug)]
pub enum DispatchOutcome {
    /// `Inserted`, `NewReview`, or `Updated` for a hash not yet mirrored
    Materialized(Materialized),
    /// Node updated in place
    Refreshed {
        hash: ContentHash,
        version: u64,
        /// Materialization of children the update newly declared
        subtree: SubtreeHandle,
    },
    /// Update not newer than the applied version
    Stale { hash: ContentHash, version: u64 },
    /// Subtree detached and unregistered
    Removed {
        hash: ContentHash,
        nodes: usize,
        revoked: usize,
    },
    /// Removal of a hash the mirror does not hold
    NotMirrored(ContentHash),
    /// Dropped by policy, or the target vanished mid-update
    Ignored(ContentHash),
}

impl DispatchOutcome {
    /// Wait for any background subtree work this dispatch started
    pub async fn settle(self) -> Result<SubtreeReport, SyncError> {
        match self {
            DispatchOutcome::Materialized(m) => m.subtree.wait().await,
            DispatchOutcome::Refreshed { subtree, .. } => subtree.wait().await,
            _ => Ok(SubtreeReport::default()),
        }
    }

    /// Short label used in logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Materialized(m) => match m.outcome {
                MaterializeOutcome::Attached => "attached",
                MaterializeOutcome::AlreadyPresent => "already_present",
                MaterializeOutcome::Revoked => "revoked",
            },
            DispatchOutcome::Refreshed { .. } => "refreshed",
            DispatchOutcome::Stale { .. } => "stale",
            DispatchOutcome::Removed { .. } => "removed",
            DispatchOutcome::NotMirrored(_) => "not_mirrored",
            DispatchOutcome::Ignored(_) => "ignored",
        }
    }
}

impl SyncEngine {
    /// Dispatch one notification and wait for its direct effect.
    ///
    /// Child materialization started by the dispatch keeps running in the
    /// background; use [`DispatchOutcome::settle`] to wait for it.
    pub async fn apply(&self, notification: Notification) -> Result<DispatchOutcome, SyncError> {
        match notification {
            Notification::Removed { hash } => Ok(self.apply_removed(hash)),
            other => {
                let ticket = self.inner.inflight.begin(*other.hash());
                self.dispatch_fetching(other, ticket).await
            }
        }
    }

    /// Dispatch a fetch-bound notification with a ticket taken at delivery time
    pub(crate) async fn dispatch_fetching(
        &self,
        notification: Notification,
        ticket: InflightGuard,
    ) -> Result<DispatchOutcome, SyncError> {
        match notification {
            Notification::Inserted { hash, index } => {
                debug!(hash = %short_hash(&hash), index, "Inserted");
                let m = self.materialize_with(hash, ticket).await?;
                Ok(DispatchOutcome::Materialized(m))
            }
            Notification::Updated { hash, version } => match self.inner.config.update_policy {
                UpdatePolicy::Ignore => {
                    debug!(hash = %short_hash(&hash), version, "Update ignored by policy");
                    Ok(DispatchOutcome::Ignored(hash))
                }
                UpdatePolicy::Refresh => self.refresh(hash, version, ticket).await,
            },
            Notification::NewReview { hash, proponent } => {
                if !self.inner.config.watch_reviews {
                    return Ok(DispatchOutcome::Ignored(hash));
                }
                let m = self
                    .materialize_review_with(hash, &proponent, ticket)
                    .await?;
                Ok(DispatchOutcome::Materialized(m))
            }
            Notification::Removed { hash } => Ok(self.apply_removed(hash)),
        }
    }

    /// Revoke in-flight materializations of `hash`, then detach it if mirrored
    #[instrument(skip(self), fields(hash = %short_hash(&hash)))]
    pub(crate) fn apply_removed(&self, hash: ContentHash) -> DispatchOutcome {
        let mut store = self.inner.store.write();
        let revoked = self.inner.inflight.revoke(&hash);
        match store.detach(&hash) {
            Some(removed) => {
                let nodes = removed.subtree_size();
                info!(nodes, revoked, "Removed subtree");
                DispatchOutcome::Removed {
                    hash,
                    nodes,
                    revoked,
                }
            }
            None => {
                debug!(revoked, "Removal of unmirrored hash");
                DispatchOutcome::NotMirrored(hash)
            }
        }
    }

    /// Apply `Updated(hash, version)` under the refresh policy
    #[instrument(skip(self, ticket), fields(hash = %short_hash(&hash)))]
    async fn refresh(
        &self,
        hash: ContentHash,
        version: u64,
        ticket: InflightGuard,
    ) -> Result<DispatchOutcome, SyncError> {
        let applied = self.inner.store.read().node(&hash).map(|n| n.version);
        match applied {
            None => {
                let m = self.materialize_with(hash, ticket).await?;
                if m.outcome == MaterializeOutcome::Attached {
                    if let Some(node) = self.inner.store.write().node_mut(&hash) {
                        node.version = Some(version);
                    }
                }
                return Ok(DispatchOutcome::Materialized(m));
            }
            Some(Some(current)) if version <= current => {
                debug!(version, current, "Stale update");
                return Ok(DispatchOutcome::Stale { hash, version });
            }
            Some(_) => {}
        }

        let record = self.inner.records.get_by_hash(&hash).await?;
        let identity = self.identity();
        let permissions = self
            .inner
            .permissions
            .resolve_cached(&identity, &hash)
            .await?;

        let lineage = Lineage::new(ticket);
        let missing = {
            let mut store = self.inner.store.write();
            if lineage.is_revoked() {
                return Ok(DispatchOutcome::Ignored(hash));
            }
            match store.node(&hash).map(|n| n.version) {
                None => return Ok(DispatchOutcome::Ignored(hash)),
                Some(Some(current)) if version <= current => {
                    return Ok(DispatchOutcome::Stale { hash, version });
                }
                Some(_) => {}
            }
            // Declared children not mirrored yet, including earlier failures
            let missing: Vec<ContentHash> = record
                .child_hashes
                .iter()
                .filter(|child| !store.contains(child))
                .copied()
                .collect();
            let Some(node) = store.node_mut(&hash) else {
                return Ok(DispatchOutcome::Ignored(hash));
            };
            node.metadata = record.metadata;
            node.child_hashes = record.child_hashes;
            node.permissions = permissions;
            node.version = Some(version);
            missing
        };

        info!(version, missing_children = missing.len(), "Refreshed node in place");
        let subtree = self.inner.spawn_children(missing, lineage);
        Ok(DispatchOutcome::Refreshed {
            hash,
            version,
            subtree,
        })
    }
}

/// Spawnable dispatch used by the watch loop
pub(crate) fn spawn_dispatch(
    engine: &SyncEngine,
    notification: Notification,
    ticket: InflightGuard,
) -> tokio::task::JoinHandle<()> {
    let engine = engine.clone();
    tokio::spawn(async move {
        let hash = *notification.hash();
        let kind = notification.kind();
        match engine.dispatch_fetching(notification, ticket).await {
            Ok(outcome) => {
                debug!(hash = %short_hash(&hash), ?kind, outcome = outcome.label(), "Dispatched")
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(hash = %short_hash(&hash), ?kind, "Notified record not found")
            }
            Err(err) => {
                tracing::error!(hash = %short_hash(&hash), ?kind, error = %err, "Dispatch failed")
            }
        }
    })
}
