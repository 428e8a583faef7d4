//! Tree and index presentation: text and json.

use crate::permissions::CapabilitySet;
use crate::store::IndexEntry;
use crate::tree::node::Node;
use crate::tree::Tree;
use crate::types::short_hash;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

/// Compact `iur` capability marker; denied operations render as `-`.
fn capability_marker(caps: &CapabilitySet) -> String {
    [
        (caps.insert.allowed, 'i'),
        (caps.update.allowed, 'u'),
        (caps.remove.allowed, 'r'),
    ]
    .iter()
    .map(|(allowed, c)| if *allowed { *c } else { '-' })
    .collect()
}

fn display_name(node: &Node) -> String {
    node.metadata
        .get("name")
        .cloned()
        .unwrap_or_else(|| short_hash(&node.content_hash))
}

pub fn format_tree_text(tree: &Tree) -> String {
    let walked = tree.walk();
    if walked.is_empty() {
        return "Mirror is empty.".to_string();
    }
    let mut output = String::new();
    for (path, node) in &walked {
        let indent = "  ".repeat(path.depth().saturating_sub(1));
        output.push_str(&format!(
            "{}{} [{}] {} {}",
            indent,
            display_name(node),
            capability_marker(&node.permissions),
            short_hash(&node.content_hash),
            path
        ));
        if node.in_review {
            let votes = node
                .review_vote
                .as_ref()
                .map(|v| format!(" +{}/-{}", v.approvals, v.rejections))
                .unwrap_or_default();
            output.push_str(&format!(" (review{})", votes));
        }
        if let Some(version) = node.version {
            output.push_str(&format!(" v{}", version));
        }
        output.push('\n');
    }
    output.push_str(&format!("\nTotal: {} node(s)", walked.len()));
    output
}

pub fn format_tree_json(tree: &Tree) -> String {
    let nodes: Vec<_> = tree
        .walk()
        .into_iter()
        .map(|(path, node)| {
            json!({
                "path": path,
                "content_hash": hex::encode(node.content_hash),
                "parent_hash": node.parent_hash.map(hex::encode),
                "metadata": node.metadata,
                "permissions": node.permissions,
                "in_review": node.in_review,
                "review_vote": node.review_vote,
                "version": node.version,
                "ordinal": node.ordinal,
            })
        })
        .collect();
    let out = json!({ "nodes": nodes, "total": nodes.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_index_text(entries: &[IndexEntry]) -> String {
    if entries.is_empty() {
        return "Index is empty.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Path", "Hash", "Depth"]);
    for entry in entries {
        table.add_row(vec![
            entry.path.to_string(),
            entry.hash.clone(),
            entry.depth.to_string(),
        ]);
    }
    format!("{}\n\nTotal: {} entr(ies)", table, entries.len())
}

pub fn format_index_json(entries: &[IndexEntry]) -> String {
    let out = json!({ "entries": entries, "total": entries.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}
