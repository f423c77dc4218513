//! Request-scoped context holder.
//!
//! A [`ContextHolder`] is created per logical request and shared inside that
//! request as `Arc<ContextHolder>`. It is the single place the rest of the
//! system asks "who is requesting data", so guards and managers stay pure
//! functions of `(context, arguments)`.

use parking_lot::RwLock;
use uuid::Uuid;

use super::context::TenantContext;
use crate::error::ContextNotSetError;

/// Marker installed alongside a system context by an audited escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRecord {
    /// Unique id of the escalation, reported in audit events.
    pub id: Uuid,
    /// The justification supplied by the caller.
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Slot {
    context: Option<TenantContext>,
    escalation: Option<EscalationRecord>,
}

/// Holds the active [`TenantContext`] for one request.
///
/// Reading an unset holder is a contract violation and returns
/// [`ContextNotSetError`]; there is no default tenant.
///
/// # Examples
///
/// ```
/// use palisade_isolation::tenant::{ContextHolder, TenantContext, TenantId};
///
/// let holder = ContextHolder::new();
/// assert!(holder.current().is_err());
///
/// holder.set(TenantContext::for_tenant(TenantId::new("acme"), "header").unwrap());
/// assert_eq!(holder.current().unwrap().tenant_id().unwrap().as_str(), "acme");
/// ```
#[derive(Debug, Default)]
pub struct ContextHolder {
    slot: RwLock<Slot>,
}

impl ContextHolder {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a holder already set to `context`.
    pub fn with_context(context: TenantContext) -> Self {
        let holder = Self::new();
        holder.set(context);
        holder
    }

    /// Returns a copy of the active context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextNotSetError`] if nothing has been set yet.
    pub fn current(&self) -> Result<TenantContext, ContextNotSetError> {
        self.slot.read().context.clone().ok_or(ContextNotSetError)
    }

    /// Returns `true` once a context has been set.
    pub fn is_set(&self) -> bool {
        self.slot.read().context.is_some()
    }

    /// Replaces the active context unconditionally.
    ///
    /// Any escalation marker is cleared: a context installed through `set` is
    /// never considered an audited escalation, even if it is a system context.
    pub fn set(&self, context: TenantContext) {
        let mut slot = self.slot.write();
        slot.context = Some(context);
        slot.escalation = None;
    }

    /// Returns `true` if the active context was installed by an audited
    /// cross-tenant escalation.
    pub fn is_escalated(&self) -> bool {
        let slot = self.slot.read();
        slot.escalation.is_some() && slot.context.as_ref().is_some_and(TenantContext::is_system)
    }

    /// Returns the escalation record of the active context, if any.
    pub fn escalation(&self) -> Option<EscalationRecord> {
        self.slot.read().escalation.clone()
    }

    pub(crate) fn snapshot(&self) -> Slot {
        self.slot.read().clone()
    }

    pub(crate) fn escalate(&self, context: TenantContext, record: EscalationRecord) {
        let mut slot = self.slot.write();
        slot.context = Some(context);
        slot.escalation = Some(record);
    }

    /// Puts `previous` back. Returns `false` when the active slot is no longer
    /// the escalation identified by `installed`.
    pub(crate) fn restore(&self, previous: Slot, installed: Uuid) -> bool {
        let mut slot = self.slot.write();
        let in_order = slot.escalation.as_ref().is_some_and(|r| r.id == installed);
        *slot = previous;
        in_order
    }
}

impl Slot {
    pub(crate) fn context(&self) -> Option<&TenantContext> {
        self.context.as_ref()
    }
}
