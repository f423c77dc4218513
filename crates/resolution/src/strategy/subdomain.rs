//! Subdomain resolution.

use std::sync::Arc;

use async_trait::async_trait;
use palisade_isolation::{TenantContext, TenantDirectory, TenantDirectoryExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{cancellable, context_for, normalize_exclusions};
use crate::error::ResolutionError;
use crate::resolver::{AdminRoleClaim, TenantResolver};
use crate::signals::RequestSignals;
use crate::source::ResolutionMethod;

/// Labels that never name a tenant unless configured otherwise.
pub const DEFAULT_SUBDOMAIN_EXCLUSIONS: &[&str] = &["www", "api", "admin"];

/// Resolves the tenant from the leading label of the request host.
///
/// `acme.app.com` resolves domain key `acme`. When the leading label is
/// excluded, the second label is used instead (`www.acme.com` resolves
/// `acme`) unless it is excluded too.
pub struct SubdomainResolver {
    directory: Arc<dyn TenantDirectory>,
    exclusions: Vec<String>,
    admin: Option<AdminRoleClaim>,
}

impl SubdomainResolver {
    /// Creates a resolver with the default exclusions.
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            exclusions: normalize_exclusions(DEFAULT_SUBDOMAIN_EXCLUSIONS.iter().copied()),
            admin: None,
        }
    }

    /// Replaces the exclusion list. Matching is case-insensitive.
    pub fn with_exclusions(mut self, exclusions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclusions = normalize_exclusions(exclusions);
        self
    }

    /// Enables the system-admin short-circuit.
    pub fn with_admin_claim(mut self, admin: AdminRoleClaim) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Extracts the domain key from a host, without any lookup.
    pub fn extract_key(&self, host: &str) -> Result<String, ResolutionError> {
        let host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();
        let labels: Vec<&str> = host.split('.').collect();

        if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
            return Err(self.no_signal(format!("host '{host}' has no subdomain")));
        }

        if !self.is_excluded(labels[0]) {
            return Ok(labels[0].to_string());
        }
        if !self.is_excluded(labels[1]) {
            return Ok(labels[1].to_string());
        }
        Err(self.no_signal(format!("host '{host}' has no subdomain outside the exclusion list")))
    }

    fn is_excluded(&self, label: &str) -> bool {
        self.exclusions.iter().any(|e| e == label)
    }

    fn no_signal(&self, reason: String) -> ResolutionError {
        ResolutionError::NoSignal {
            method: ResolutionMethod::Subdomain,
            reason,
        }
    }
}

#[async_trait]
impl TenantResolver for SubdomainResolver {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Subdomain
    }

    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        self.admin.as_ref()
    }

    #[instrument(skip_all, fields(host = signals.host().unwrap_or_default()))]
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        let host = signals
            .host()
            .ok_or_else(|| self.no_signal("request has no host".to_string()))?;
        let key = self.extract_key(host)?;

        match cancellable(cancel, self.directory.active_by_domain(&key)).await? {
            Some(info) => {
                debug!(domain_key = %key, tenant_id = %info.id, "Resolved tenant from subdomain");
                context_for(info, format!("subdomain:{key}"))
            }
            None => Err(ResolutionError::NotFound {
                method: ResolutionMethod::Subdomain,
                identifier: key,
            }),
        }
    }
}

/// Removes a trailing `:port`, keeping bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
