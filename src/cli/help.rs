//! Command-name contract used for log spans.

use crate::cli::parse::Commands;

/// Command name string for logging (e.g. "tree", "replay").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Tree { .. } => "tree",
        Commands::Index { .. } => "index",
        Commands::Replay { .. } => "replay",
        Commands::Check { .. } => "check",
        Commands::Config => "config",
    }
}
