//! The resolver contract.
//!
//! A [`TenantResolver`] turns [`RequestSignals`] into a [`TenantContext`].
//! Strategies implement [`resolve_tenant`](TenantResolver::resolve_tenant);
//! callers use [`resolve`](TenantResolver::resolve), which applies the
//! system-admin short-circuit uniformly before any strategy logic runs.

use std::sync::Arc;

use async_trait::async_trait;
use palisade_isolation::TenantContext;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ResolutionError;
use crate::signals::RequestSignals;
use crate::source::ResolutionMethod;

/// A claim type/value pair that grants system context.
///
/// When the caller's claims contain this exact pair, resolution returns a
/// system context without consulting the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRoleClaim {
    /// Claim type, e.g. `role`.
    pub claim_type: String,
    /// Required value, e.g. `system-admin`.
    pub value: String,
}

impl AdminRoleClaim {
    /// Creates an admin role claim.
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if `signals` carry this claim.
    pub fn matches(&self, signals: &RequestSignals) -> bool {
        signals.has_claim(&self.claim_type, &self.value)
    }

    /// Returns the source tag used for admin system contexts.
    pub fn source_tag(&self) -> String {
        format!("admin:{}={}", self.claim_type, self.value)
    }
}

/// Derives a tenant context from request signals.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Returns the kind of this resolver.
    fn method(&self) -> ResolutionMethod;

    /// Returns the admin role claim, if system-admin bypass is enabled.
    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        None
    }

    /// Strategy-specific resolution. Callers should use
    /// [`resolve`](Self::resolve) instead.
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError>;

    /// Resolves the request.
    ///
    /// A caller holding the admin role claim gets a system context
    /// immediately. Otherwise the strategy runs, unless `cancel` has already
    /// fired.
    async fn resolve(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        if let Some(admin) = self.admin_claim() {
            if admin.matches(signals) {
                debug!(method = %self.method(), claim_type = %admin.claim_type, "System-admin claim present, resolving to system context");
                return Ok(TenantContext::system(admin.source_tag()));
            }
        }
        if cancel.is_cancelled() {
            return Err(ResolutionError::Cancelled);
        }
        self.resolve_tenant(signals, cancel).await
    }
}

/// A shareable resolver.
pub type SharedResolver = Arc<dyn TenantResolver>;
