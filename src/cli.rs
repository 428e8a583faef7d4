//! CLI domain: parse, route, help, output, and presentation only.
//! No sync logic here; the route table drives the engine and formats its results.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_check_text, format_index_json, format_index_text, format_load_summary,
    format_replay_json, format_replay_text, format_tree_json, format_tree_text, ReplayStep,
};
pub use route::RunContext;
