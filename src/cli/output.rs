//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::SyncError;

/// Map engine errors to a string for CLI output.
pub fn map_error(e: &SyncError) -> String {
    match e {
        SyncError::NotFound(_) => {
            format!("{}\nhint: the hash is not in the ledger fixture", e)
        }
        SyncError::ConfigError(_) => format!(
            "{}\nhint: run `fsmirror config` to inspect the effective configuration",
            e
        ),
        _ => e.to_string(),
    }
}
