//! Load, replay and check presentation.

use crate::sync::LoadReport;
use crate::tree::Tree;
use serde::Serialize;
use serde_json::json;

use super::mirror::format_tree_text;

/// One applied notification in a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub kind: String,
    pub hash: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn format_load_summary(report: &LoadReport) -> String {
    let mut output = format!(
        "Loaded {} entr(ies): {} attached, {} already present, {} mirrored",
        report.enumerated, report.nodes.attached, report.nodes.already_present, report.mirrored
    );
    if !report.nodes.failures.is_empty() {
        output.push_str(&format!("\n{} failure(s):", report.nodes.failures.len()));
        for failure in &report.nodes.failures {
            output.push_str(&format!("\n  {}: {}", hex::encode(&failure.hash[..8]), failure.error));
        }
    }
    output
}

pub fn format_replay_text(steps: &[ReplayStep], tree: &Tree) -> String {
    let mut output = String::from("Replayed notifications:\n");
    for (i, step) in steps.iter().enumerate() {
        output.push_str(&format!(
            "  {:>3}. {:<10} {} -> {}",
            i + 1,
            step.kind,
            &step.hash[..step.hash.len().min(16)],
            step.outcome
        ));
        if let Some(ref error) = step.error {
            output.push_str(&format!(" ({})", error));
        }
        output.push('\n');
    }
    output.push('\n');
    output.push_str(&format_tree_text(tree));
    output
}

pub fn format_replay_json(steps: &[ReplayStep], tree: &Tree) -> String {
    let tree_json: serde_json::Value =
        serde_json::from_str(&super::mirror::format_tree_json(tree)).unwrap_or(json!({}));
    let out = json!({ "steps": steps, "tree": tree_json });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_check_text(nodes: usize) -> String {
    format!("Mirror consistent: {} node(s), index and tree agree", nodes)
}
