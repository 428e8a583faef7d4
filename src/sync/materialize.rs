//! Recursive Materializer
//!
//! Fetches records, resolves their capabilities and attaches them to the mirror.
//! Children of an attached node are materialized on a spawned task; the direct node
//! is present as soon as `materialize` returns.

use super::{EngineInner, SyncEngine};
use crate::concurrency::{InflightGuard, Lineage};
use crate::error::SyncError;
use crate::store::AttachOutcome;
use crate::tree::node::Node;
use crate::tree::path::TreePath;
use crate::types::{short_hash, ContentHash, Identity};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// What a single materialization did with its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeOutcome {
    Attached,
    /// Already indexed; nothing fetched or attached
    AlreadyPresent,
    /// A removal for the hash arrived while the fetch was in flight
    Revoked,
}

/// Result of materializing one hash
#[derive(Debug)]
pub struct Materialized {
    /// Copy of the node, without children
    pub node: Node,
    /// Position in the forest; `None` when revoked
    pub path: Option<TreePath>,
    pub outcome: MaterializeOutcome,
    pub subtree: SubtreeHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializeFailure {
    #[serde(with = "crate::types::hex_hash")]
    pub hash: ContentHash,
    pub error: String,
}

/// Aggregated result of a subtree materialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubtreeReport {
    pub attached: usize,
    pub already_present: usize,
    pub revoked: usize,
    pub failures: Vec<MaterializeFailure>,
}

impl SubtreeReport {
    fn record(&mut self, outcome: MaterializeOutcome) {
        match outcome {
            MaterializeOutcome::Attached => self.attached += 1,
            MaterializeOutcome::AlreadyPresent => self.already_present += 1,
            MaterializeOutcome::Revoked => self.revoked += 1,
        }
    }

    fn fail(&mut self, hash: ContentHash, error: &SyncError) {
        self.failures.push(MaterializeFailure {
            hash,
            error: error.to_string(),
        });
    }

    pub fn merge(&mut self, other: SubtreeReport) {
        self.attached += other.attached;
        self.already_present += other.already_present;
        self.revoked += other.revoked;
        self.failures.extend(other.failures);
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Completion handle for a node's background child materialization.
///
/// Dropping the handle does not cancel the work.
#[derive(Debug, Default)]
pub struct SubtreeHandle {
    task: Option<JoinHandle<SubtreeReport>>,
}

impl SubtreeHandle {
    /// Handle for a node with nothing left to materialize
    pub fn empty() -> Self {
        Self { task: None }
    }

    pub fn is_empty(&self) -> bool {
        self.task.is_none()
    }

    /// Wait for the whole subtree (children and all their descendants)
    pub async fn wait(self) -> Result<SubtreeReport, SyncError> {
        match self.task {
            None => Ok(SubtreeReport::default()),
            Some(task) => task
                .await
                .map_err(|e| SyncError::TaskFailed(format!("subtree materialization: {}", e))),
        }
    }
}

/// Result of an initial corpus load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Entries enumerated from the store (1 for a rooted load)
    pub enumerated: u64,
    pub nodes: SubtreeReport,
    /// Indexed node count after the load
    pub mirrored: usize,
}

/// Direct result of one materialization step, before fan-out
pub(crate) struct Step {
    pub node: Node,
    pub path: Option<TreePath>,
    pub outcome: MaterializeOutcome,
    pub children: Vec<ContentHash>,
    /// Tickets handed down to the children
    pub lineage: Lineage,
}

impl EngineInner {
    /// Already-indexed node for `hash`, as a step
    fn indexed_step(&self, hash: &ContentHash, lineage: &Lineage) -> Option<Step> {
        let store = self.store.read();
        let path = store.lookup(hash)?.clone();
        let node = store.node(hash)?.detached_copy();
        Some(Step {
            node,
            path: Some(path),
            outcome: MaterializeOutcome::AlreadyPresent,
            children: Vec::new(),
            lineage: lineage.clone(),
        })
    }

    /// Fetch and attach the accepted record for `hash` (no fan-out)
    pub(crate) async fn materialize_one(
        &self,
        hash: ContentHash,
        lineage: Lineage,
    ) -> Result<Step, SyncError> {
        if let Some(step) = self.indexed_step(&hash, &lineage) {
            debug!(hash = %short_hash(&hash), "Already mirrored");
            return Ok(step);
        }
        let record = self.records.get_by_hash(&hash).await?;
        let identity = self.identity.current_identity();
        let permissions = self.permissions.resolve_cached(&identity, &hash).await?;
        self.attach_fetched(Node::from_record(record, permissions), lineage)
    }

    /// Fetch and attach the provisional record for `hash` proposed by `proponent`
    pub(crate) async fn materialize_review_one(
        &self,
        hash: ContentHash,
        proponent: &Identity,
        ticket: InflightGuard,
    ) -> Result<Step, SyncError> {
        let lineage = Lineage::new(ticket);
        if let Some(step) = self.indexed_step(&hash, &lineage) {
            return Ok(step);
        }
        let record = self.records.get_in_review(&hash, proponent).await?;
        let viewer = self.identity.current_identity();
        let vote = self.votes.get_vote(&hash, proponent, &viewer).await?;
        let mut step = self.attach_fetched(Node::in_review(record, vote), lineage)?;
        step.children.clear();
        Ok(step)
    }

    /// Attach a fetched node, re-validating dedup and revocation under the store lock.
    ///
    /// Revocation covers the node's own ticket and the tickets of every ancestor that
    /// declared it, so a removed folder's pending children never land at the root.
    fn attach_fetched(&self, node: Node, lineage: Lineage) -> Result<Step, SyncError> {
        let hash = node.content_hash;
        let mut store = self.store.write();

        if lineage.is_revoked() {
            info!(
                hash = %short_hash(&hash),
                depth = lineage.depth(),
                "Materialization revoked by removal"
            );
            return Ok(Step {
                node,
                path: None,
                outcome: MaterializeOutcome::Revoked,
                children: Vec::new(),
                lineage,
            });
        }

        let parent_path = node
            .parent_hash
            .as_ref()
            .and_then(|parent| store.lookup(parent).cloned());
        if let (Some(parent), None) = (node.parent_hash.as_ref(), parent_path.as_ref()) {
            debug!(
                hash = %short_hash(&hash),
                parent = %short_hash(parent),
                "Parent not mirrored; attaching at forest root"
            );
        }

        let children = node.child_hashes.clone();
        match store.attach(node, parent_path.as_ref()) {
            Ok(AttachOutcome::Attached(path)) => {
                let node = store
                    .node(&hash)
                    .map(Node::detached_copy)
                    .ok_or(SyncError::NotFound(hash))?;
                debug!(hash = %short_hash(&hash), path = %path, "Attached");
                Ok(Step {
                    node,
                    path: Some(path),
                    outcome: MaterializeOutcome::Attached,
                    children,
                    lineage,
                })
            }
            Ok(AttachOutcome::AlreadyPresent(path)) => {
                let node = store
                    .node(&hash)
                    .map(Node::detached_copy)
                    .ok_or(SyncError::NotFound(hash))?;
                Ok(Step {
                    node,
                    path: Some(path),
                    outcome: MaterializeOutcome::AlreadyPresent,
                    children: Vec::new(),
                    lineage,
                })
            }
            Err(err) => {
                let path = parent_path.unwrap_or_else(|| TreePath::from_offsets(Vec::new()));
                warn!(hash = %short_hash(&hash), error = %err, "Attach failed");
                Err(SyncError::ParentNotFound { hash, path })
            }
        }
    }

    /// Spawn materialization of `children` and their descendants under `lineage`
    pub(crate) fn spawn_children(
        self: &Arc<Self>,
        children: Vec<ContentHash>,
        lineage: Lineage,
    ) -> SubtreeHandle {
        if children.is_empty() {
            return SubtreeHandle::empty();
        }
        let inner = Arc::clone(self);
        SubtreeHandle {
            task: Some(tokio::spawn(inner.materialize_children(children, lineage))),
        }
    }

    /// Materialize sibling subtrees concurrently; one failure never stops the others
    fn materialize_children(
        self: Arc<Self>,
        children: Vec<ContentHash>,
        lineage: Lineage,
    ) -> BoxFuture<'static, SubtreeReport> {
        async move {
            let mut pending: FuturesUnordered<_> = children
                .into_iter()
                .map(|child| {
                    let inner = Arc::clone(&self);
                    let lineage = lineage.child(self.inflight.begin(child));
                    async move { (child, inner.materialize_tree(child, lineage).await) }
                })
                .collect();

            let mut report = SubtreeReport::default();
            while let Some((child, result)) = pending.next().await {
                match result {
                    Ok(subtree) => report.merge(subtree),
                    Err(err) => {
                        warn!(hash = %short_hash(&child), error = %err, "Child materialization failed");
                        report.fail(child, &err);
                    }
                }
            }
            report
        }
        .boxed()
    }

    /// Materialize `hash` and wait for its whole subtree
    pub(crate) fn materialize_tree(
        self: Arc<Self>,
        hash: ContentHash,
        lineage: Lineage,
    ) -> BoxFuture<'static, Result<SubtreeReport, SyncError>> {
        async move {
            let step = self.materialize_one(hash, lineage).await?;
            let mut report = SubtreeReport::default();
            report.record(step.outcome);
            if !step.children.is_empty() {
                let subtree = Arc::clone(&self)
                    .materialize_children(step.children, step.lineage)
                    .await;
                report.merge(subtree);
            }
            Ok(report)
        }
        .boxed()
    }
}

impl SyncEngine {
    /// Materialize `hash`, returning once its own node is attached.
    ///
    /// Re-entrant and idempotent: a hash that is already mirrored returns
    /// `AlreadyPresent` without fetching.
    #[instrument(skip(self), fields(hash = %short_hash(&hash)))]
    pub async fn materialize(&self, hash: ContentHash) -> Result<Materialized, SyncError> {
        let ticket = self.inner.inflight.begin(hash);
        self.materialize_with(hash, ticket).await
    }

    pub(crate) async fn materialize_with(
        &self,
        hash: ContentHash,
        ticket: InflightGuard,
    ) -> Result<Materialized, SyncError> {
        let step = self
            .inner
            .materialize_one(hash, Lineage::new(ticket))
            .await?;
        let subtree = self.inner.spawn_children(step.children, step.lineage);
        Ok(Materialized {
            node: step.node,
            path: step.path,
            outcome: step.outcome,
            subtree,
        })
    }

    /// Materialize a provisional record as a read-only review entry.
    ///
    /// Its capabilities are all denied and its declared children are not followed.
    #[instrument(skip(self), fields(hash = %short_hash(&hash), proponent = %proponent))]
    pub async fn materialize_review(
        &self,
        hash: ContentHash,
        proponent: &Identity,
    ) -> Result<Materialized, SyncError> {
        let ticket = self.inner.inflight.begin(hash);
        self.materialize_review_with(hash, proponent, ticket).await
    }

    pub(crate) async fn materialize_review_with(
        &self,
        hash: ContentHash,
        proponent: &Identity,
        ticket: InflightGuard,
    ) -> Result<Materialized, SyncError> {
        let step = self
            .inner
            .materialize_review_one(hash, proponent, ticket)
            .await?;
        Ok(Materialized {
            node: step.node,
            path: step.path,
            outcome: step.outcome,
            subtree: SubtreeHandle::empty(),
        })
    }

    /// Materialize `hash` and wait for its entire subtree
    pub async fn materialize_all(&self, hash: ContentHash) -> Result<SubtreeReport, SyncError> {
        let lineage = Lineage::new(self.inner.inflight.begin(hash));
        Arc::clone(&self.inner).materialize_tree(hash, lineage).await
    }

    /// Initial load of the mirror.
    ///
    /// With a root hash, that folder is materialized recursively. Without one, every
    /// record the store enumerates is materialized in enumeration order. Failing
    /// entries are reported and skipped.
    #[instrument(skip(self))]
    pub async fn load(&self, root: Option<ContentHash>) -> Result<LoadReport, SyncError> {
        let identity = self.identity();
        self.inner.permissions.base(&identity).await?;

        let mut report = LoadReport::default();
        match root {
            Some(hash) => {
                report.enumerated = 1;
                report.nodes = self.materialize_all(hash).await?;
            }
            None => {
                let count = self.inner.records.count().await?;
                report.enumerated = count;
                for i in 0..count {
                    let hash = match self.inner.records.type_index(i).await {
                        Ok(hash) => hash,
                        Err(err) => {
                            warn!(index = i, error = %err, "Enumeration entry unavailable");
                            continue;
                        }
                    };
                    match self.materialize_all(hash).await {
                        Ok(nodes) => report.nodes.merge(nodes),
                        Err(err) => {
                            warn!(hash = %short_hash(&hash), error = %err, "Entry materialization failed");
                            report.nodes.fail(hash, &err);
                        }
                    }
                }
            }
        }
        report.mirrored = self.len();
        info!(
            enumerated = report.enumerated,
            attached = report.nodes.attached,
            failures = report.nodes.failures.len(),
            mirrored = report.mirrored,
            "Mirror loaded"
        );
        Ok(report)
    }
}
