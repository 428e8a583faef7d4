//! CLI presentation: text and json formatters per command family.

mod mirror;
mod report;

pub use mirror::{format_index_json, format_index_text, format_tree_json, format_tree_text};
pub use report::{
    format_check_text, format_load_summary, format_replay_json, format_replay_text, ReplayStep,
};
