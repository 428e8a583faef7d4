//! ConfigLoader facade delegating to the merge service.

use super::merge::service::MergeService;
use super::FsMirrorConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file, workspace files and environment.
    pub fn load(workspace_root: &Path) -> Result<FsMirrorConfig, ConfigError> {
        MergeService::load(workspace_root)
    }

    /// Load configuration from a specific file, with the environment overlay on top.
    pub fn load_from_file(path: &Path) -> Result<FsMirrorConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> FsMirrorConfig {
        FsMirrorConfig::default()
    }
}
