//! Error types for the fsmirror synchronization engine.

use crate::tree::path::TreePath;
use crate::types::{short_hash, ContentHash};
use thiserror::Error;

/// Structural errors raised by the tree mutator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Parent path not found in tree: {0}")]
    ParentNotFound(TreePath),

    #[error("Path not found in tree: {0}")]
    PathNotFound(TreePath),
}

/// Engine-level errors surfaced to callers of the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Record not found in remote store: {}", short_hash(.0))]
    NotFound(ContentHash),

    #[error("Parent not found for {}: {}", short_hash(.hash), .path)]
    ParentNotFound { hash: ContentHash, path: TreePath },

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Remote collaborator error: {0}")]
    Remote(String),

    #[error("Engine is already watching the change feed")]
    AlreadyWatching,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Mirror inconsistent:\n{0}")]
    Inconsistent(String),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::ConfigError(err.to_string())
    }
}

impl SyncError {
    /// NotFound is terminal for the hash; everything else may succeed on redelivery.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
