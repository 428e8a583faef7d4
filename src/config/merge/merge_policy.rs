//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("identity", "")?
        .set_default("sync.confirmations", 2)?
        .set_default("sync.update_policy", "refresh")?
        .set_default("sync.enumerate_on_start", true)?
        .set_default("sync.watch_reviews", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
