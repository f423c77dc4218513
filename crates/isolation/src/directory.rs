//! Tenant directory interface.
//!
//! The directory is an external, read-only collaborator that knows which
//! tenants exist. Resolution consults it; the isolation layer never mutates
//! it. Not found and inactive are the same outcome for every caller, which is
//! what [`TenantDirectoryExt::active_by_id`] and
//! [`TenantDirectoryExt::active_by_domain`] provide.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::tenant::TenantId;

/// Read model describing one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    /// Primary key.
    pub id: TenantId,
    /// Human-readable name.
    pub display_name: String,
    /// Domain key used in hosts, paths and claim lists (e.g. `acme`).
    pub domain_key: String,
    /// Inactive tenants never resolve.
    pub is_active: bool,
    /// When the tenant was provisioned.
    pub created_at: DateTime<Utc>,
}

impl TenantInfo {
    /// Creates an active tenant entry created now.
    pub fn new(
        id: impl Into<TenantId>,
        display_name: impl Into<String>,
        domain_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            domain_key: domain_key.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Returns this entry marked inactive.
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Lookup of tenant metadata by id or domain key.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Looks a tenant up by its domain key.
    async fn lookup_by_domain(&self, domain_key: &str) -> Result<Option<TenantInfo>, DirectoryError>;

    /// Looks a tenant up by its id.
    async fn lookup_by_id(&self, id: &TenantId) -> Result<Option<TenantInfo>, DirectoryError>;

    /// Lists all active tenants.
    async fn list_active(&self) -> Result<Vec<TenantInfo>, DirectoryError>;
}

/// Lookups that fold "inactive" into "not found".
#[async_trait]
pub trait TenantDirectoryExt: TenantDirectory {
    /// Returns the tenant with this id if it exists and is active.
    async fn active_by_id(&self, id: &TenantId) -> Result<Option<TenantInfo>, DirectoryError> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.lookup_by_id(id).await?.filter(|t| t.is_active))
    }

    /// Returns the tenant with this domain key if it exists and is active.
    async fn active_by_domain(&self, domain_key: &str) -> Result<Option<TenantInfo>, DirectoryError> {
        if domain_key.trim().is_empty() {
            return Ok(None);
        }
        Ok(self.lookup_by_domain(domain_key).await?.filter(|t| t.is_active))
    }
}

impl<T: TenantDirectory + ?Sized> TenantDirectoryExt for T {}

/// A directory held in memory.
///
/// Domain keys are matched case-insensitively. Useful for tests, fixtures and
/// deployments whose tenant list is loaded from configuration at startup.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, TenantInfo>>,
}

impl InMemoryTenantDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory containing the given tenants.
    pub fn with_tenants(tenants: impl IntoIterator<Item = TenantInfo>) -> Self {
        let directory = Self::new();
        for tenant in tenants {
            directory.upsert(tenant);
        }
        directory
    }

    /// Inserts or replaces a tenant entry.
    pub fn upsert(&self, tenant: TenantInfo) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    /// Removes a tenant entry.
    pub fn remove(&self, id: &TenantId) -> Option<TenantInfo> {
        self.tenants.write().remove(id)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn lookup_by_domain(&self, domain_key: &str) -> Result<Option<TenantInfo>, DirectoryError> {
        let tenants = self.tenants.read();
        Ok(tenants
            .values()
            .find(|t| t.domain_key.eq_ignore_ascii_case(domain_key))
            .cloned())
    }

    async fn lookup_by_id(&self, id: &TenantId) -> Result<Option<TenantInfo>, DirectoryError> {
        Ok(self.tenants.read().get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<TenantInfo>, DirectoryError> {
        let mut active: Vec<_> = self
            .tenants
            .read()
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryTenantDirectory {
        InMemoryTenantDirectory::with_tenants([
            TenantInfo::new("t-acme", "Acme Corp", "acme"),
            TenantInfo::new("t-contoso", "Contoso", "contoso"),
            TenantInfo::new("t-initech", "Initech", "initech").deactivated(),
        ])
    }

    #[tokio::test]
    async fn test_lookup_by_domain_case_insensitive() {
        let dir = directory();
        let found = dir.lookup_by_domain("ACME").await.unwrap().unwrap();
        assert_eq!(found.id.as_str(), "t-acme");
    }

    #[tokio::test]
    async fn test_lookup_by_id() {
        let dir = directory();
        assert!(dir.lookup_by_id(&TenantId::new("t-contoso")).await.unwrap().is_some());
        assert!(dir.lookup_by_id(&TenantId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_is_treated_as_missing() {
        let dir = directory();
        assert!(dir.lookup_by_domain("initech").await.unwrap().is_some());
        assert!(dir.active_by_domain("initech").await.unwrap().is_none());
        assert!(dir.active_by_id(&TenantId::new("t-initech")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_keys_never_match() {
        let dir = directory();
        assert!(dir.active_by_domain("").await.unwrap().is_none());
        assert!(dir.active_by_id(&TenantId::new("")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_sorted() {
        let dir = directory();
        let ids: Vec<_> = dir
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["t-acme", "t-contoso"]);
    }

    #[test]
    fn test_tenant_info_serde() {
        let info = TenantInfo::new("t1", "Tenant One", "one");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["domainKey"], "one");
        assert_eq!(json["isActive"], true);
    }
}
