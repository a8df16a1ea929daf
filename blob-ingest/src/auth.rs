use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{IngestError, IngestResult, PermissionLevel};

/// Authorization collaborator consulted before any store access
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Ok if `user_id` holds at least `required` on `tenant_id`,
    /// otherwise [`IngestError::Forbidden`].
    async fn check_permission(
        &self,
        tenant_id: &str,
        user_id: &str,
        required: PermissionLevel,
    ) -> IngestResult<()>;
}

/// Grants every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn check_permission(
        &self,
        _tenant_id: &str,
        _user_id: &str,
        _required: PermissionLevel,
    ) -> IngestResult<()> {
        Ok(())
    }
}

/// Explicit `(tenant, user) -> level` grants
#[derive(Debug, Default)]
pub struct MemoryAuthorizer {
    grants: RwLock<HashMap<(String, String), PermissionLevel>>,
}

impl MemoryAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant<T: Into<String>, U: Into<String>>(&self, tenant_id: T, user_id: U, level: PermissionLevel) {
        self.grants
            .write()
            .insert((tenant_id.into(), user_id.into()), level);
    }

    pub fn revoke(&self, tenant_id: &str, user_id: &str) {
        self.grants
            .write()
            .remove(&(tenant_id.to_string(), user_id.to_string()));
    }
}

#[async_trait]
impl Authorizer for MemoryAuthorizer {
    async fn check_permission(
        &self,
        tenant_id: &str,
        user_id: &str,
        required: PermissionLevel,
    ) -> IngestResult<()> {
        let granted = self
            .grants
            .read()
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .copied();

        match granted {
            Some(level) if level >= required => Ok(()),
            _ => Err(IngestError::forbidden(tenant_id, user_id, required)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_implies_read() {
        let auth = MemoryAuthorizer::new();
        auth.grant("ws", "alice", PermissionLevel::Write);

        assert!(auth.check_permission("ws", "alice", PermissionLevel::Read).await.is_ok());
        assert!(auth.check_permission("ws", "alice", PermissionLevel::Write).await.is_ok());
    }

    #[tokio::test]
    async fn read_grant_cannot_write() {
        let auth = MemoryAuthorizer::new();
        auth.grant("ws", "bob", PermissionLevel::Read);

        let err = auth
            .check_permission("ws", "bob", PermissionLevel::Write)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Forbidden { required: PermissionLevel::Write, .. }
        ));
    }

    #[tokio::test]
    async fn grants_are_per_tenant() {
        let auth = MemoryAuthorizer::new();
        auth.grant("ws-1", "carol", PermissionLevel::Write);
        auth.revoke("ws-1", "nobody");

        assert!(auth.check_permission("ws-2", "carol", PermissionLevel::Read).await.is_err());
    }
}
