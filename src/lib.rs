//! fsmirror: local hierarchical mirror of a content-addressed remote file store
//!
//! The [`sync::SyncEngine`] keeps an ordered forest of file/folder nodes and an
//! identifier index consistent with the remote store as insert, update, remove and
//! review notifications arrive out of order.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;
pub mod permissions;
pub mod remote;
pub mod store;
pub mod sync;
pub mod tree;
pub mod types;

pub use error::{SyncError, TreeError};
pub use sync::{Collaborators, SyncEngine};
pub use types::{ContentHash, Identity};
