//! CLI route: single route table and run context. Drives the sync engine and presentation.

use crate::cli::help::command_name;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_check_text, format_index_json, format_index_text, format_load_summary,
    format_replay_json, format_replay_text, format_tree_json, format_tree_text, ReplayStep,
};
use crate::config::{ConfigLoader, FsMirrorConfig};
use crate::error::SyncError;
use crate::remote::{MemoryLedger, Notification};
use crate::sync::{Collaborators, LoadReport, SyncEngine};
use crate::types::{parse_hash, ContentHash, Identity};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// Runtime context for CLI execution: effective config, ledger fixture and async runtime.
pub struct RunContext {
    config: FsMirrorConfig,
    ledger_path: Option<PathBuf>,
    runtime: tokio::runtime::Runtime,
}

impl RunContext {
    /// Create run context from workspace root, optional config path and CLI overrides.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        ledger_path: Option<PathBuf>,
        identity: Option<String>,
    ) -> Result<Self, SyncError> {
        let mut config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        if let Some(identity) = identity {
            config.identity = Identity::new(identity);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| SyncError::TaskFailed(format!("Failed to start async runtime: {}", e)))?;

        Ok(Self {
            config,
            ledger_path,
            runtime,
        })
    }

    pub fn config(&self) -> &FsMirrorConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        let span = info_span!("command", name = command_name(command));
        let _entered = span.enter();

        match command {
            Commands::Config => self
                .config
                .to_toml()
                .map_err(|e| SyncError::ConfigError(format!("Failed to render config: {}", e))),
            Commands::Tree { root, format } => {
                let (engine, report) = self.load_engine(root.as_deref())?;
                let tree = engine.snapshot();
                if format == "json" {
                    Ok(format_tree_json(&tree))
                } else {
                    Ok(format!(
                        "{}\n\n{}",
                        format_load_summary(&report),
                        format_tree_text(&tree)
                    ))
                }
            }
            Commands::Index { root, format } => {
                let (engine, _) = self.load_engine(root.as_deref())?;
                let entries = engine.index_entries();
                if format == "json" {
                    Ok(format_index_json(&entries))
                } else {
                    Ok(format_index_text(&entries))
                }
            }
            Commands::Replay {
                events,
                root,
                format,
            } => {
                let notifications = read_notifications(events)?;
                let (engine, _) = self.load_engine(root.as_deref())?;
                let steps = self.runtime.block_on(replay(&engine, notifications));
                let tree = engine.snapshot();
                if format == "json" {
                    Ok(format_replay_json(&steps, &tree))
                } else {
                    Ok(format_replay_text(&steps, &tree))
                }
            }
            Commands::Check { root } => {
                let (engine, _) = self.load_engine(root.as_deref())?;
                engine
                    .verify()
                    .map(|_| format_check_text(engine.len()))
                    .map_err(|violations| SyncError::Inconsistent(violations.join("\n")))
            }
        }
    }

    /// Validate config, build the engine over the ledger fixture and run the initial load.
    fn load_engine(&self, root: Option<&str>) -> Result<(SyncEngine, LoadReport), SyncError> {
        self.config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SyncError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;

        let ledger_path = self.ledger_path.as_ref().ok_or_else(|| {
            SyncError::ConfigError("--ledger <fixture.json> is required for this command".into())
        })?;
        let ledger = Arc::new(MemoryLedger::load_fixture(ledger_path)?);
        let engine = SyncEngine::new(
            Collaborators::from_ledger(ledger, self.config.identity.clone()),
            self.config.sync.clone(),
        );

        let root = self.resolve_root(root)?;
        if root.is_none() && !self.config.sync.enumerate_on_start {
            info!("Enumeration disabled and no root configured; starting empty");
            return Ok((engine, LoadReport::default()));
        }
        let report = self.runtime.block_on(engine.load(root))?;
        Ok((engine, report))
    }

    fn resolve_root(&self, cli_root: Option<&str>) -> Result<Option<ContentHash>, SyncError> {
        match cli_root {
            Some(raw) => parse_hash(raw).map(Some).map_err(SyncError::ConfigError),
            None => self.config.sync.root().map_err(SyncError::ConfigError),
        }
    }
}

fn read_notifications(path: &Path) -> Result<Vec<Notification>, SyncError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SyncError::ConfigError(format!("Failed to read events file {:?}: {}", path, e))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        SyncError::ConfigError(format!("Failed to parse events file {:?}: {}", path, e))
    })
}

/// Apply notifications in order, waiting for each one's subtree before the next
async fn replay(engine: &SyncEngine, notifications: Vec<Notification>) -> Vec<ReplayStep> {
    let mut steps = Vec::with_capacity(notifications.len());
    for notification in notifications {
        let kind = format!("{:?}", notification.kind()).to_lowercase();
        let hash = hex::encode(notification.hash());
        let step = match engine.apply(notification).await {
            Ok(outcome) => {
                let label = outcome.label().to_string();
                match outcome.settle().await {
                    Ok(report) if report.is_complete() => ReplayStep {
                        kind,
                        hash,
                        outcome: label,
                        error: None,
                    },
                    Ok(report) => ReplayStep {
                        kind,
                        hash,
                        outcome: label,
                        error: Some(format!("{} descendant(s) failed", report.failures.len())),
                    },
                    Err(e) => ReplayStep {
                        kind,
                        hash,
                        outcome: label,
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => {
                warn!(hash = %hash, error = %e, "Replay step failed");
                ReplayStep {
                    kind,
                    hash,
                    outcome: "failed".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };
        steps.push(step);
    }
    steps
}
