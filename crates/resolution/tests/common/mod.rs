//! Shared fixtures for resolution integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use palisade_isolation::{
    DirectoryError, InMemoryTenantDirectory, TenantDirectory, TenantId, TenantInfo,
};

/// Tenants known to every test: acme, contoso, initech, plus an inactive
/// tenant under domain key `old`.
pub fn tenants() -> Vec<TenantInfo> {
    vec![
        TenantInfo::new(TenantId::new("t-acme"), "Acme Corp", "acme"),
        TenantInfo::new(TenantId::new("t-contoso"), "Contoso Ltd", "contoso"),
        TenantInfo::new(TenantId::new("t-initech"), "Initech", "initech"),
        TenantInfo::new(TenantId::new("t-old"), "Old Co", "old").deactivated(),
    ]
}

pub fn directory() -> Arc<dyn TenantDirectory> {
    Arc::new(InMemoryTenantDirectory::with_tenants(tenants()))
}

/// A directory that counts lookups and can be switched offline.
#[derive(Debug)]
pub struct CountingDirectory {
    inner: InMemoryTenantDirectory,
    pub id_lookups: AtomicUsize,
    pub domain_lookups: AtomicUsize,
    offline: AtomicBool,
}

impl CountingDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryTenantDirectory::with_tenants(tenants()),
            id_lookups: AtomicUsize::new(0),
            domain_lookups: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }

    pub fn domain_lookups(&self) -> usize {
        self.domain_lookups.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), DirectoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable {
                message: "directory offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for CountingDirectory {
    async fn lookup_by_domain(&self, domain_key: &str) -> Result<Option<TenantInfo>, DirectoryError> {
        self.domain_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.inner.lookup_by_domain(domain_key).await
    }

    async fn lookup_by_id(&self, id: &TenantId) -> Result<Option<TenantInfo>, DirectoryError> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.inner.lookup_by_id(id).await
    }

    async fn list_active(&self) -> Result<Vec<TenantInfo>, DirectoryError> {
        self.check_online()?;
        self.inner.list_active().await
    }
}
