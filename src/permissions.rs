//! Permission Overlay
//!
//! Computes an identity's effective insert/update/remove capabilities on a resource by
//! laying a per-resource override over the identity's base capability set. The base
//! set is fetched once from the permission service and kept as read-mostly state.

use crate::error::SyncError;
use crate::remote::PermissionService;
use crate::types::{short_hash, ContentHash, Identity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Allowed/denied flag for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub allowed: bool,
}

impl Capability {
    pub const ALLOWED: Capability = Capability { allowed: true };
    pub const DENIED: Capability = Capability { allowed: false };
}

/// Operation a capability governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Remove,
}

/// Per-identity capability set on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub insert: Capability,
    pub update: Capability,
    pub remove: Capability,
}

impl CapabilitySet {
    pub fn allowed() -> Self {
        Self {
            insert: Capability::ALLOWED,
            update: Capability::ALLOWED,
            remove: Capability::ALLOWED,
        }
    }

    pub fn denied() -> Self {
        Self {
            insert: Capability::DENIED,
            update: Capability::DENIED,
            remove: Capability::DENIED,
        }
    }

    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::Insert => self.insert.allowed,
            Operation::Update => self.update.allowed,
            Operation::Remove => self.remove.allowed,
        }
    }
}

/// Resource-specific override. Each operation is overridden only when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityOverride {
    #[serde(default)]
    pub insert: Option<bool>,
    #[serde(default)]
    pub update: Option<bool>,
    #[serde(default)]
    pub remove: Option<bool>,
}

/// Lay `over` on top of `base`. Present override values win, absent ones keep the base.
pub fn overlay(base: &CapabilitySet, over: Option<&CapabilityOverride>) -> CapabilitySet {
    let Some(over) = over else {
        return *base;
    };
    let pick = |base: Capability, value: Option<bool>| match value {
        Some(allowed) => Capability { allowed },
        None => base,
    };
    CapabilitySet {
        insert: pick(base.insert, over.insert),
        update: pick(base.update, over.update),
        remove: pick(base.remove, over.remove),
    }
}

/// Resolves capability sets against the permission service, caching base sets per identity
pub struct PermissionResolver {
    service: Arc<dyn PermissionService>,
    base: RwLock<HashMap<Identity, CapabilitySet>>,
}

impl PermissionResolver {
    pub fn new(service: Arc<dyn PermissionService>) -> Self {
        Self {
            service,
            base: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch and cache the base capability set for `identity`
    pub async fn refresh_base(&self, identity: &Identity) -> Result<CapabilitySet, SyncError> {
        let base = self.service.get_base_capabilities(identity).await?;
        self.base.write().insert(identity.clone(), base);
        info!(identity = %identity, ?base, "Cached base capabilities");
        Ok(base)
    }

    /// Cached base set of `identity`, fetched on first use
    pub async fn base(&self, identity: &Identity) -> Result<CapabilitySet, SyncError> {
        let cached = self.base.read().get(identity).copied();
        match cached {
            Some(base) => Ok(base),
            None => self.refresh_base(identity).await,
        }
    }

    /// Effective capabilities of `identity` on `resource`, starting from `base`
    pub async fn resolve(
        &self,
        identity: &Identity,
        base: &CapabilitySet,
        resource: &ContentHash,
    ) -> Result<CapabilitySet, SyncError> {
        let over = self.service.get_override(identity, resource).await?;
        let resolved = overlay(base, over.as_ref());
        debug!(
            identity = %identity,
            resource = %short_hash(resource),
            overridden = over.is_some(),
            "Resolved capabilities"
        );
        Ok(resolved)
    }

    /// Effective capabilities using the cached base set
    pub async fn resolve_cached(
        &self,
        identity: &Identity,
        resource: &ContentHash,
    ) -> Result<CapabilitySet, SyncError> {
        let base = self.base(identity).await?;
        self.resolve(identity, &base, resource).await
    }
}
