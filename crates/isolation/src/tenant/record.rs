//! The capability contract for tenant-isolated records.

use super::id::TenantId;

/// A domain entity owned by exactly one tenant.
///
/// Any type passed through the [`IsolationGuard`](crate::guard::IsolationGuard)
/// implements this trait. It replaces runtime inspection of arbitrary entity
/// types with a compile-time bound.
///
/// # Examples
///
/// ```
/// use palisade_isolation::tenant::{TenantId, TenantScoped};
///
/// #[derive(Clone)]
/// struct Invoice {
///     id: String,
///     tenant_id: TenantId,
///     total: u64,
/// }
///
/// impl TenantScoped for Invoice {
///     const ENTITY_TYPE: &'static str = "Invoice";
///
///     fn record_id(&self) -> &str {
///         &self.id
///     }
///
///     fn tenant_id(&self) -> Option<&TenantId> {
///         self.tenant_id.non_empty()
///     }
///
///     fn assign_tenant(&mut self, tenant_id: TenantId) {
///         self.tenant_id = tenant_id;
///     }
/// }
/// ```
pub trait TenantScoped: Clone + Send + Sync + 'static {
    /// Entity type name used in errors and audit events.
    const ENTITY_TYPE: &'static str;

    /// Returns the record's primary key.
    fn record_id(&self) -> &str;

    /// Returns the owning tenant, or `None` when the record has no owner yet.
    ///
    /// Implementations should map an empty stored id to `None`.
    fn tenant_id(&self) -> Option<&TenantId>;

    /// Stamps the record with its owning tenant.
    fn assign_tenant(&mut self, tenant_id: TenantId);
}
