//! CLI parse: clap types for fsmirror. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fsmirror - mirror a content-addressed remote file store as a local tree
#[derive(Parser)]
#[command(name = "fsmirror")]
#[command(about = "Local hierarchical mirror of a content-addressed remote file store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON ledger fixture standing in for the remote store
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Workspace root directory (for config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Acting identity (overrides config)
    #[arg(long)]
    pub identity: Option<String>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the mirror and print the forest
    Tree {
        /// Hex content hash of the folder to mirror (default: config or whole corpus)
        #[arg(long)]
        root: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Load the mirror and print the identifier index
    Index {
        #[arg(long)]
        root: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Load the mirror, apply a JSON list of notifications in order, print the result
    Replay {
        /// JSON file holding an array of notifications
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        root: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Load the mirror and verify index/tree consistency
    Check {
        #[arg(long)]
        root: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}
