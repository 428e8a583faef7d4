//! Watch runtime
//!
//! Subscribes the engine to the change feed and drains notifications from a single
//! consumer task. Removals are applied inline, in delivery order. Fetch-bound
//! notifications take their in-flight ticket inline and then run on their own task,
//! so a hung fetch never holds up later notifications and a later removal can still
//! revoke them.

use super::events::spawn_dispatch;
use super::SyncEngine;
use crate::error::SyncError;
use crate::remote::{Notification, NotificationKind, SubscriptionId};
use crate::types::short_hash;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub(crate) struct WatchState {
    subscriptions: Vec<SubscriptionId>,
    consumer: JoinHandle<()>,
}

impl SyncEngine {
    /// Subscribe to every notification kind and start the consumer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin_watching(&self) -> Result<(), SyncError> {
        let mut watcher = self.inner.watcher.lock();
        if watcher.is_some() {
            return Err(SyncError::AlreadyWatching);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::TaskFailed(format!("no async runtime: {}", e)))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriptions: Vec<SubscriptionId> = NotificationKind::ALL
            .iter()
            .filter(|kind| **kind != NotificationKind::Review || self.inner.config.watch_reviews)
            .map(|kind| self.inner.feed.subscribe(*kind, sender.clone()))
            .collect();
        drop(sender);

        let engine = self.clone();
        let consumer = runtime.spawn(async move { engine.consume(receiver).await });

        info!(subscriptions = subscriptions.len(), "Watching change feed");
        *watcher = Some(WatchState {
            subscriptions,
            consumer,
        });
        Ok(())
    }

    /// Unsubscribe and stop the consumer. Returns false when not watching.
    ///
    /// Dispatches already handed to their own task run to completion.
    pub async fn stop_watching(&self) -> bool {
        let state = self.inner.watcher.lock().take();
        let Some(state) = state else {
            return false;
        };
        for id in &state.subscriptions {
            self.inner.feed.unsubscribe(*id);
        }
        state.consumer.abort();
        // Cancellation is the expected outcome here
        let _ = state.consumer.await;
        info!("Stopped watching change feed");
        true
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watcher.lock().is_some()
    }

    async fn consume(self, mut receiver: mpsc::UnboundedReceiver<Notification>) {
        while let Some(notification) = receiver.recv().await {
            match notification {
                Notification::Removed { hash } => {
                    let outcome = self.apply_removed(hash);
                    debug!(hash = %short_hash(&hash), outcome = outcome.label(), "Dispatched");
                }
                other => {
                    let ticket = self.inner.inflight.begin(*other.hash());
                    spawn_dispatch(&self, other, ticket);
                }
            }
        }
        debug!("Notification channel closed");
    }
}
