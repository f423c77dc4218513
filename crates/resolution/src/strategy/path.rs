//! Path-segment resolution.

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

/// Segments that never name a tenant unless configured otherwise.
pub const DEFAULT_PATH_EXCLUSIONS: &[&str] = &["api", "admin"];

/// Resolves the tenant from the first path segment (`/acme/invoices`).
pub struct PathResolver {
    directory: Arc<dyn TenantDirectory>,
    exclusions: Vec<String>,
    admin: Option<AdminRoleClaim>,
}

impl PathResolver {
    /// Creates a resolver with the default exclusions.
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            exclusions: normalize_exclusions(DEFAULT_PATH_EXCLUSIONS.iter().copied()),
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

    /// Extracts the domain key from a path, without any lookup.
    pub fn extract_key(&self, path: &str) -> Result<String, ResolutionError> {
        let segment = path.split('/').find(|s| !s.is_empty()).ok_or_else(|| {
            ResolutionError::NoSignal {
                method: ResolutionMethod::PathSegment,
                reason: "path has no segments".to_string(),
            }
        })?;

        if self.exclusions.iter().any(|e| e.eq_ignore_ascii_case(segment)) {
            return Err(ResolutionError::NoSignal {
                method: ResolutionMethod::PathSegment,
                reason: format!("first path segment '{segment}' is excluded"),
            });
        }
        Ok(segment.to_string())
    }
}

#[async_trait]
impl TenantResolver for PathResolver {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::PathSegment
    }

    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        self.admin.as_ref()
    }

    #[instrument(skip_all, fields(path = signals.path()))]
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        let key = self.extract_key(signals.path())?;

        match cancellable(cancel, self.directory.active_by_domain(&key)).await? {
            Some(info) => {
                debug!(domain_key = %key, tenant_id = %info.id, "Resolved tenant from path segment");
                context_for(info, format!("path:{key}"))
            }
            None => Err(ResolutionError::NotFound {
                method: ResolutionMethod::PathSegment,
                identifier: key,
            }),
        }
    }
}
