//! Cross-source validation.
//!
//! Two checks live here:
//!
//! - [`DomainValidationMode`] selects the request-domain signal a claim
//!   resolver anchors caller-supplied tenant lists against.
//! - [`SourceConsistency`] verifies that every strategy able to resolve a
//!   request agrees on the tenant (strict mode).

use palisade_isolation::{TenantContext, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;
use crate::source::ResolutionMethod;

/// Which independently resolved signal claim candidates must match.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainValidationMode {
    /// Accept the first active candidate without cross-validation.
    #[default]
    None,
    /// Candidates must match the tenant named by the request subdomain.
    ValidateAgainstSubdomain,
    /// Candidates must match the tenant named by the first path segment.
    ValidateAgainstPath,
    /// Candidates must match the tenant named by the header or query value.
    ValidateAgainstHeaderOrQuery,
}

impl DomainValidationMode {
    /// Returns the method of the anchor resolver this mode requires.
    pub fn anchor_method(&self) -> Option<ResolutionMethod> {
        match self {
            DomainValidationMode::None => None,
            DomainValidationMode::ValidateAgainstSubdomain => Some(ResolutionMethod::Subdomain),
            DomainValidationMode::ValidateAgainstPath => Some(ResolutionMethod::PathSegment),
            DomainValidationMode::ValidateAgainstHeaderOrQuery => {
                Some(ResolutionMethod::HeaderOrQuery)
            }
        }
    }
}

/// Result of running every strategy against one request.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    /// The context from the first strategy that succeeded.
    pub context: TenantContext,
    /// The strategy that produced `context`.
    pub method: ResolutionMethod,
    /// Every strategy that resolved a tenant, in order.
    pub all_sources: Vec<(ResolutionMethod, TenantId)>,
}

/// Validates tenant consistency across sources.
pub struct SourceConsistency;

impl SourceConsistency {
    /// Validates that all sources agree on the tenant.
    ///
    /// Returns [`ResolutionError::TenantMismatch`] naming the first source
    /// that disagrees with the primary one.
    pub fn validate_consistency(resolved: &ResolvedTenant) -> Result<(), ResolutionError> {
        let Some((primary_method, primary_tenant)) = resolved.all_sources.first() else {
            return Ok(());
        };

        for (method, tenant_id) in resolved.all_sources.iter().skip(1) {
            if tenant_id != primary_tenant {
                return Err(ResolutionError::TenantMismatch {
                    primary_tenant: primary_tenant.clone(),
                    primary_method: *primary_method,
                    conflicting_tenant: tenant_id.clone(),
                    conflicting_method: *method,
                });
            }
        }

        Ok(())
    }
}
