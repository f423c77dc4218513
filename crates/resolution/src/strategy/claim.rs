//! Identity-claim resolution with optional domain validation.

use std::sync::Arc;

use async_trait::async_trait;
use palisade_isolation::{TenantContext, TenantDirectory, TenantId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{context_for, lookup_id_then_domain};
use crate::error::{ConfigError, ResolutionError};
use crate::resolver::{AdminRoleClaim, SharedResolver, TenantResolver};
use crate::signals::RequestSignals;
use crate::source::ResolutionMethod;
use crate::validation::DomainValidationMode;

/// Claim names consulted when none are configured.
pub const DEFAULT_CLAIM_NAMES: &[&str] = &["tenant_id", "tenants"];

const CANDIDATE_SEPARATORS: &[char] = &[',', ' ', ';'];

/// Resolves the tenant from an identity claim.
///
/// A claim may carry a single tenant or a list (`acme,contoso`). The whole
/// value is tried first, then each list entry; every candidate is looked up
/// as a tenant id and then as a domain key.
///
/// With a [`DomainValidationMode`] other than `None`, a candidate is only
/// accepted when it matches the tenant an anchor resolver derives
/// independently from the request (subdomain, path or header). This stops a
/// user holding several tenants from reaching one through another tenant's
/// URL.
pub struct ClaimResolver {
    directory: Arc<dyn TenantDirectory>,
    claim_names: Vec<String>,
    validation: Option<(DomainValidationMode, SharedResolver)>,
    admin: Option<AdminRoleClaim>,
}

impl ClaimResolver {
    /// Creates a resolver reading the default claim names, without
    /// domain validation.
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            claim_names: DEFAULT_CLAIM_NAMES.iter().map(|s| s.to_string()).collect(),
            validation: None,
            admin: None,
        }
    }

    /// Replaces the ordered claim names.
    pub fn with_claim_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.claim_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Requires candidates to match the tenant `anchor` resolves.
    ///
    /// `DomainValidationMode::None` clears any previous validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `anchor` does not resolve by the method
    /// `mode` validates against.
    pub fn with_domain_validation(
        mut self,
        mode: DomainValidationMode,
        anchor: SharedResolver,
    ) -> Result<Self, ConfigError> {
        self.validation = match mode.anchor_method() {
            None => None,
            Some(expected) if anchor.method() == expected => Some((mode, anchor)),
            Some(expected) => {
                return Err(ConfigError {
                    problems: vec![format!(
                        "Domain validation mode {mode:?} needs a {expected} anchor, got {}",
                        anchor.method()
                    )],
                });
            }
        };
        Ok(self)
    }

    /// Enables the system-admin short-circuit.
    pub fn with_admin_claim(mut self, admin: AdminRoleClaim) -> Self {
        self.admin = Some(admin);
        self
    }

    /// The active validation mode.
    pub fn validation_mode(&self) -> DomainValidationMode {
        self.validation
            .as_ref()
            .map(|(mode, _)| *mode)
            .unwrap_or_default()
    }

    /// Finds the first configured claim with a non-empty value.
    pub fn find_claim<'a>(&'a self, signals: &'a RequestSignals) -> Option<(&'a str, &'a str)> {
        self.claim_names.iter().find_map(|name| {
            signals
                .claims()
                .iter()
                .filter(|c| c.name == *name)
                .map(|c| c.value.trim())
                .find(|v| !v.is_empty())
                .map(|v| (name.as_str(), v))
        })
    }

    /// Resolves the anchor tenant. A typed resolution failure means the
    /// request carries no independent tenant, so nothing can match.
    async fn anchor_tenant(
        anchor: &SharedResolver,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<Option<TenantId>, ResolutionError> {
        match anchor.resolve_tenant(signals, cancel).await {
            Ok(context) => Ok(context.tenant_id().cloned()),
            Err(e) if e.is_resolution_failure() => {
                debug!(anchor = %anchor.method(), error = %e, "Domain validation anchor did not resolve");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Splits a claim value into lookup candidates: the whole value, then each
/// separated entry, without duplicates.
fn candidates(value: &str) -> Vec<String> {
    let mut out = vec![value.to_string()];
    for part in value.split(CANDIDATE_SEPARATORS).map(str::trim) {
        if !part.is_empty() && !out.iter().any(|c| c == part) {
            out.push(part.to_string());
        }
    }
    out
}

#[async_trait]
impl TenantResolver for ClaimResolver {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Claim
    }

    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        self.admin.as_ref()
    }

    #[instrument(skip_all, fields(validation = ?self.validation_mode()))]
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        let (name, value) = self.find_claim(signals).ok_or_else(|| ResolutionError::NoSignal {
            method: ResolutionMethod::Claim,
            reason: format!("none of claims [{}] present", self.claim_names.join(", ")),
        })?;

        // Resolved at most once, and only when an active candidate needs it.
        let mut anchor: Option<Option<TenantId>> = None;
        let mut rejected = Vec::new();

        for candidate in candidates(value) {
            let Some(info) = lookup_id_then_domain(self.directory.as_ref(), &candidate, cancel).await?
            else {
                continue;
            };

            let Some((_, anchor_resolver)) = &self.validation else {
                debug!(claim = name, tenant_id = %info.id, "Resolved tenant from claim");
                return context_for(info, format!("claim:{name}"));
            };

            if anchor.is_none() {
                anchor = Some(Self::anchor_tenant(anchor_resolver, signals, cancel).await?);
            }
            if anchor.as_ref().and_then(Option::as_ref) == Some(&info.id) {
                debug!(claim = name, tenant_id = %info.id, "Resolved tenant from claim, domain validated");
                return context_for(info, format!("claim:{name}"));
            }
            rejected.push(candidate);
        }

        if rejected.is_empty() {
            return Err(ResolutionError::NotFound {
                method: ResolutionMethod::Claim,
                identifier: value.to_string(),
            });
        }

        let request_tenant = anchor.flatten();
        warn!(
            claim = name,
            claimed = ?rejected,
            request_tenant = ?request_tenant,
            "Claimed tenants do not match the request domain"
        );
        Err(ResolutionError::DomainMismatch {
            method: ResolutionMethod::Claim,
            claimed: rejected,
            request_tenant,
        })
    }
}
