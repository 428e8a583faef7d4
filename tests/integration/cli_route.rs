//! CLI route table driven end to end over a ledger fixture

use crate::integration::test_utils::{record, with_children};
use fsmirror::cli::{Commands, RunContext};
use fsmirror::error::SyncError;
use fsmirror::remote::{LedgerFixture, Notification};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    ledger: PathBuf,
    folder: String,
    child: String,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let folder = record("projects", None);
    let child = record("plan.md", Some(&folder));
    let folder = with_children(folder, &[&child]);

    let fixture = LedgerFixture {
        records: vec![folder.clone(), child.clone()],
        ..LedgerFixture::default()
    };
    let ledger = dir.path().join("ledger.json");
    std::fs::write(&ledger, serde_json::to_string_pretty(&fixture).unwrap()).unwrap();

    Workspace {
        ledger,
        folder: hex::encode(folder.content_hash),
        child: hex::encode(child.content_hash),
        dir,
    }
}

fn context(root: &Path, ledger: Option<PathBuf>) -> RunContext {
    RunContext::new(
        root.to_path_buf(),
        None,
        ledger,
        Some("alice".to_string()),
    )
    .unwrap()
}

#[test]
fn test_tree_command_prints_loaded_forest() {
    let ws = workspace();
    let ctx = context(ws.dir.path(), Some(ws.ledger.clone()));

    let output = ctx
        .execute(&Commands::Tree {
            root: None,
            format: "text".to_string(),
        })
        .unwrap();
    assert!(output.contains("projects"));
    assert!(output.contains("plan.md"));
    assert!(output.contains("Total: 2 node(s)"));
}

#[test]
fn test_index_json_lists_every_hash() {
    let ws = workspace();
    let ctx = context(ws.dir.path(), Some(ws.ledger.clone()));

    let output = ctx
        .execute(&Commands::Index {
            root: Some(ws.folder.clone()),
            format: "json".to_string(),
        })
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    let rendered = value.to_string();
    assert!(rendered.contains(&ws.folder));
    assert!(rendered.contains(&ws.child));
}

#[test]
fn test_replay_applies_notifications_in_order() {
    let ws = workspace();
    let events = ws.dir.path().join("events.json");
    let child: [u8; 32] = hex::decode(&ws.child).unwrap().try_into().unwrap();
    let notifications = vec![
        Notification::Removed { hash: child },
        Notification::Removed { hash: child },
    ];
    std::fs::write(&events, serde_json::to_string(&notifications).unwrap()).unwrap();
    let ctx = context(ws.dir.path(), Some(ws.ledger.clone()));

    let output = ctx
        .execute(&Commands::Replay {
            events,
            root: None,
            format: "json".to_string(),
        })
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    let steps = value["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["outcome"], "removed");
    assert_eq!(steps[1]["outcome"], "not_mirrored");
}

#[test]
fn test_check_reports_consistent_mirror() {
    let ws = workspace();
    let ctx = context(ws.dir.path(), Some(ws.ledger.clone()));
    let output = ctx.execute(&Commands::Check { root: None }).unwrap();
    assert!(output.starts_with("Mirror consistent: 2 node(s)"));
}

#[test]
fn test_ledger_required_for_mirror_commands() {
    let ws = workspace();
    let ctx = context(ws.dir.path(), None);
    let err = ctx.execute(&Commands::Check { root: None }).unwrap_err();
    assert!(matches!(err, SyncError::ConfigError(_)));

    let rendered = ctx.execute(&Commands::Config).unwrap();
    assert!(rendered.contains("identity = \"alice\""));
}
