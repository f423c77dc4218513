//! Tenant context for data access.
//!
//! This module defines [`TenantContext`], the immutable answer to "who is
//! requesting data right now". A context is either bound to exactly one tenant
//! or is the unrestricted system context, and always records where it came
//! from.

use std::fmt;

use serde::Serialize;

use super::id::TenantId;
use crate::error::ContextError;

/// The resolved identity under which an operation executes.
///
/// `TenantContext` is created once per resolution or escalation and never
/// edited afterwards. Replacing the active context means storing a new value
/// in the [`ContextHolder`](super::ContextHolder).
///
/// # Invariant
///
/// `is_system()` is `true` exactly when `tenant_id()` is `None`. The two
/// constructors are the only way to build a context, so the invariant cannot
/// be broken from outside.
///
/// # Examples
///
/// ```
/// use palisade_isolation::tenant::{TenantContext, TenantId};
///
/// let ctx = TenantContext::for_tenant(TenantId::new("acme"), "subdomain:acme").unwrap();
/// assert_eq!(ctx.tenant_id().map(|t| t.as_str()), Some("acme"));
/// assert!(!ctx.is_system());
///
/// let system = TenantContext::system("maintenance");
/// assert!(system.is_system());
/// assert!(system.tenant_id().is_none());
///
/// assert!(TenantContext::for_tenant(TenantId::new(""), "header").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TenantContext {
    /// The tenant identifier; `None` in system mode.
    tenant_id: Option<TenantId>,
    /// Provenance tag, e.g. `subdomain:acme` or `Cross-tenant: nightly billing`.
    source: String,
    /// Optional correlation ID for request tracing.
    correlation_id: Option<String>,
    /// Optional user ID for audit purposes.
    user_id: Option<String>,
}

impl TenantContext {
    /// Creates a context bound to a single tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyTenantId`] if `tenant_id` is empty.
    pub fn for_tenant(tenant_id: TenantId, source: impl Into<String>) -> Result<Self, ContextError> {
        let source = source.into();
        if tenant_id.is_empty() {
            return Err(ContextError::EmptyTenantId { source_tag: source });
        }
        Ok(Self {
            tenant_id: Some(tenant_id),
            source,
            correlation_id: None,
            user_id: None,
        })
    }

    /// Creates the unrestricted system context.
    ///
    /// Reads under this context observe every tenant. Writes additionally
    /// require an audited escalation, see
    /// [`CrossTenantManager`](crate::cross_tenant::CrossTenantManager).
    pub fn system(source: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            source: source.into(),
            correlation_id: None,
            user_id: None,
        }
    }

    /// Returns a copy of this context carrying the given correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns a copy of this context carrying the given user ID.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns the tenant ID, or `None` for the system context.
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    /// Returns `true` if this is the system context.
    pub fn is_system(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Returns the provenance tag.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user ID, if set.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns `true` if a record owned by `owner` is visible under this context.
    ///
    /// This is the read predicate `is_system OR record.tenant == context.tenant`.
    /// Records without an owner are only visible to the system context.
    pub fn admits(&self, owner: Option<&TenantId>) -> bool {
        match &self.tenant_id {
            None => true,
            Some(current) => owner.is_some_and(|owner| owner == current),
        }
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant_id {
            Some(id) => write!(f, "tenant {} ({})", id, self.source),
            None => write!(f, "system ({})", self.source),
        }
    }
}
