use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use witrack_protocol::{IdentityId, SpaceId, WitError, WitResult};

/// A permission on a space, e.g. `contribute`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Scope(pub String);

impl Scope {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Required to create or delete tracker queries in a space.
    pub fn contribute() -> Self {
        Self::new("contribute")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// `Ok` when `identity` holds `scope` on `space_id`, `Forbidden` otherwise.
    async fn require_scope(
        &self,
        identity: IdentityId,
        space_id: SpaceId,
        scope: &Scope,
    ) -> WitResult<()>;
}

/// Grants every scope to every identity.
#[derive(Debug, Default, Clone)]
pub struct AllowAllAuthService;

#[async_trait]
impl AuthService for AllowAllAuthService {
    async fn require_scope(
        &self,
        _identity: IdentityId,
        _space_id: SpaceId,
        _scope: &Scope,
    ) -> WitResult<()> {
        Ok(())
    }
}

/// Explicit per-space grants held in memory.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthService {
    grants: Arc<RwLock<HashMap<(IdentityId, SpaceId), IndexSet<Scope>>>>,
}

impl StaticAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, identity: IdentityId, space_id: SpaceId, scope: Scope) {
        self.grants
            .write()
            .await
            .entry((identity, space_id))
            .or_default()
            .insert(scope);
    }

    pub async fn revoke(&self, identity: IdentityId, space_id: SpaceId, scope: &Scope) {
        let mut grants = self.grants.write().await;
        if let Some(scopes) = grants.get_mut(&(identity, space_id)) {
            scopes.shift_remove(scope);
            if scopes.is_empty() {
                grants.remove(&(identity, space_id));
            }
        }
    }

    pub async fn scopes(&self, identity: IdentityId, space_id: SpaceId) -> Vec<Scope> {
        self.grants
            .read()
            .await
            .get(&(identity, space_id))
            .map(|scopes| scopes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuthService for StaticAuthService {
    async fn require_scope(
        &self,
        identity: IdentityId,
        space_id: SpaceId,
        scope: &Scope,
    ) -> WitResult<()> {
        let granted = self
            .grants
            .read()
            .await
            .get(&(identity, space_id))
            .is_some_and(|scopes| scopes.contains(scope));
        if granted {
            return Ok(());
        }
        warn!(%identity, %space_id, %scope, "scope denied");
        Err(WitError::Forbidden(format!(
            "identity {identity} lacks scope '{scope}' on space {space_id}"
        )))
    }
}
