//! Effective capabilities of mirrored nodes

use crate::integration::test_utils::{engine_with, record};
use fsmirror::config::SyncConfig;
use fsmirror::permissions::{Capability, CapabilityOverride, CapabilitySet, Operation};
use fsmirror::remote::{IdentityProvider, MemoryLedger};
use fsmirror::sync::{Collaborators, SyncEngine};
use fsmirror::types::Identity;
use parking_lot::Mutex;
use std::sync::Arc;

fn read_only() -> CapabilitySet {
    CapabilitySet {
        insert: Capability::DENIED,
        update: Capability::DENIED,
        remove: Capability::DENIED,
    }
}

#[tokio::test]
async fn test_override_wins_over_base_per_operation() {
    let ledger = Arc::new(MemoryLedger::new());
    let shared = record("shared", None);
    let private = record("private", None);
    ledger.seed(shared.clone());
    ledger.seed(private.clone());
    ledger.set_base_capabilities(Identity::new("carol"), read_only());
    ledger.set_override(
        Identity::new("carol"),
        shared.content_hash,
        CapabilityOverride {
            insert: Some(true),
            ..CapabilityOverride::default()
        },
    );

    let engine = engine_with(&ledger, "carol", SyncConfig::default());
    engine.load(None).await.unwrap();

    let shared_node = engine.node(&shared.content_hash).unwrap();
    assert!(shared_node.permissions.allows(Operation::Insert));
    assert!(!shared_node.permissions.allows(Operation::Update));
    assert!(!shared_node.permissions.allows(Operation::Remove));

    let private_node = engine.node(&private.content_hash).unwrap();
    assert_eq!(private_node.permissions, read_only());
}

#[tokio::test]
async fn test_override_for_other_identity_is_ignored() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("folder", None);
    ledger.seed(folder.clone());
    ledger.set_override(
        Identity::new("dave"),
        folder.content_hash,
        CapabilityOverride {
            remove: Some(false),
            ..CapabilityOverride::default()
        },
    );

    let engine = engine_with(&ledger, "erin", SyncConfig::default());
    engine.materialize(folder.content_hash).await.unwrap();
    let node = engine.node(&folder.content_hash).unwrap();
    assert_eq!(node.permissions, CapabilitySet::allowed());
}

#[tokio::test]
async fn test_default_capabilities_apply_without_explicit_base() {
    let ledger = Arc::new(MemoryLedger::new());
    let folder = record("folder", None);
    ledger.seed(folder.clone());
    ledger.set_default_capabilities(read_only());

    let engine = engine_with(&ledger, "guest", SyncConfig::default());
    let base = engine.refresh_base_capabilities().await.unwrap();
    assert_eq!(base, read_only());

    engine.materialize(folder.content_hash).await.unwrap();
    assert_eq!(
        engine.node(&folder.content_hash).unwrap().permissions,
        read_only()
    );
}

/// Session identity that can change between materializations
struct SwitchingIdentity(Mutex<Identity>);

impl IdentityProvider for SwitchingIdentity {
    fn current_identity(&self) -> Identity {
        self.0.lock().clone()
    }
}

#[tokio::test]
async fn test_identity_switch_uses_new_base_capabilities() {
    let ledger = Arc::new(MemoryLedger::new());
    let first = record("first", None);
    let second = record("second", None);
    ledger.seed(first.clone());
    ledger.seed(second.clone());
    ledger.set_base_capabilities(Identity::new("admin"), CapabilitySet::allowed());
    ledger.set_base_capabilities(Identity::new("guest"), read_only());

    let identity = Arc::new(SwitchingIdentity(Mutex::new(Identity::new("admin"))));
    let collaborators = Collaborators {
        records: ledger.clone(),
        permissions: ledger.clone(),
        votes: ledger.clone(),
        feed: ledger.clone(),
        identity: identity.clone(),
    };
    let engine = SyncEngine::new(collaborators, SyncConfig::default());

    engine.materialize(first.content_hash).await.unwrap();
    *identity.0.lock() = Identity::new("guest");
    engine.materialize(second.content_hash).await.unwrap();

    assert_eq!(
        engine.node(&first.content_hash).unwrap().permissions,
        CapabilitySet::allowed()
    );
    assert_eq!(
        engine.node(&second.content_hash).unwrap().permissions,
        read_only()
    );
}
