//! Configuration System
//!
//! Layered configuration for the mirror: built-in defaults, the user's global file,
//! workspace files, then `FSMIRROR_*` environment variables. Validation collects every
//! problem instead of stopping at the first.

use crate::logging::LoggingConfig;
use crate::sync::UpdatePolicy;
use crate::types::{parse_hash, ContentHash, Identity};
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsMirrorConfig {
    /// Acting identity used for permission resolution and votes
    #[serde(default)]
    pub identity: Identity,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronization engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Confirmations required before an insert/remove transaction counts as accepted
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,

    #[serde(default)]
    pub update_policy: UpdatePolicy,

    /// Hex content hash of the folder to mirror; the whole corpus when unset
    #[serde(default)]
    pub root_hash: Option<String>,

    /// Enumerate the store on start when no root hash is set
    #[serde(default = "default_true")]
    pub enumerate_on_start: bool,

    /// Follow review (provisional record) notifications
    #[serde(default = "default_true")]
    pub watch_reviews: bool,
}

fn default_confirmations() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            update_policy: UpdatePolicy::default(),
            root_hash: None,
            enumerate_on_start: default_true(),
            watch_reviews: default_true(),
        }
    }
}

impl SyncConfig {
    /// Parsed root hash, if one is configured
    pub fn root(&self) -> Result<Option<ContentHash>, String> {
        self.root_hash.as_deref().map(parse_hash).transpose()
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.confirmations == 0 {
            errors.push("confirmations must be at least 1".to_string());
        }
        if let Err(e) = self.root() {
            errors.push(format!("root_hash: {}", e));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Identity(String),
    Sync(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Identity(msg) => write!(f, "Identity: {}", msg),
            ValidationError::Sync(msg) => write!(f, "Sync: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl FsMirrorConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.identity.is_empty() {
            errors.push(ValidationError::Identity(
                "identity must be set (config `identity`, FSMIRROR_IDENTITY or --identity)"
                    .to_string(),
            ));
        }

        if let Err(sync_errors) = self.sync.validate() {
            errors.extend(sync_errors.into_iter().map(ValidationError::Sync));
        }

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
