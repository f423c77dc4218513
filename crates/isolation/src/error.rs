//! Error types for the isolation layer.
//!
//! The hierarchy separates context errors (programming defects), isolation
//! errors (enforcement outcomes), escalation errors, and failures of the
//! external collaborators (directory, store, observation sink).

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::tenant::TenantId;

/// Umbrella error for everything this crate can report.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid context construction
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Holder read before set
    #[error(transparent)]
    ContextNotSet(#[from] ContextNotSetError),

    /// Enforcement outcomes from the isolation guard
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// Cross-tenant escalation errors
    #[error(transparent)]
    Escalation(#[from] EscalationError),

    /// Tenant directory failures
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Record store failures
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while constructing a [`TenantContext`](crate::tenant::TenantContext).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A tenant context was requested for an empty tenant id.
    #[error("cannot create tenant context with an empty tenant id (source: {source_tag})")]
    EmptyTenantId { source_tag: String },
}

/// The context holder was read before anything was set.
///
/// This is an integration defect: the resolver did not run, or code is
/// executing outside a request. It must surface, never be replaced by a
/// default tenant.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("tenant context has not been set for this operation")]
pub struct ContextNotSetError;

/// The category of an isolation violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A tenant context tried to create a record stamped for another tenant.
    CrossTenantCreate,
    /// A tenant context tried to re-stamp a record to another tenant.
    CrossTenantReassignment,
    /// A tenant context tried to update or delete a record it does not own.
    ForeignRecordMutation,
    /// The system context tried to create a record without an owner.
    MissingExplicitTenant,
    /// A system-mode write was attempted without an audited escalation.
    UnauthorizedEscalation,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::CrossTenantCreate => write!(f, "cross_tenant_create"),
            ViolationKind::CrossTenantReassignment => write!(f, "cross_tenant_reassignment"),
            ViolationKind::ForeignRecordMutation => write!(f, "foreign_record_mutation"),
            ViolationKind::MissingExplicitTenant => write!(f, "missing_explicit_tenant"),
            ViolationKind::UnauthorizedEscalation => write!(f, "unauthorized_escalation"),
        }
    }
}

/// A write that would cross a tenant boundary.
///
/// Always fatal to the triggering operation and always reported to the
/// observation hooks at the highest severity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("isolation violation ({kind}) on {entity_type}{}: {message}", .entity_id.as_deref().map(|id| format!("/{id}")).unwrap_or_default())]
pub struct IsolationViolation {
    pub kind: ViolationKind,
    pub expected_tenant: Option<TenantId>,
    pub actual_tenant: Option<TenantId>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub message: String,
}

impl IsolationViolation {
    /// Violation for a system-context create without an explicit owner.
    pub fn missing_explicit_tenant(entity_type: &str, entity_id: Option<&str>) -> Self {
        Self {
            kind: ViolationKind::MissingExplicitTenant,
            expected_tenant: None,
            actual_tenant: None,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            message: "system context requires explicit tenantId".to_string(),
        }
    }

    /// Violation for a tenant mismatch between the context and a record.
    pub fn tenant_mismatch(
        kind: ViolationKind,
        expected: &TenantId,
        actual: Option<&TenantId>,
        entity_type: &str,
        entity_id: Option<&str>,
    ) -> Self {
        let message = format!(
            "expected tenant {}, found {}",
            expected,
            actual.map(TenantId::as_str).unwrap_or("<none>")
        );
        Self {
            kind,
            expected_tenant: Some(expected.clone()),
            actual_tenant: actual.cloned(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            message,
        }
    }
}

/// Errors returned by the isolation guard.
#[derive(Error, Debug)]
pub enum IsolationError {
    /// The write would cross a tenant boundary.
    #[error(transparent)]
    Violation(#[from] IsolationViolation),

    /// The record does not exist or is not visible to the current tenant.
    ///
    /// The two cases are deliberately indistinguishable.
    #[error("{entity_type}/{id} not found")]
    NotFound { entity_type: String, id: String },

    /// A system-mode write without an audited cross-tenant escalation.
    #[error("{operation} on {entity_type} in system context requires an audited cross-tenant escalation")]
    UnauthorizedEscalation {
        entity_type: String,
        operation: String,
    },

    #[error(transparent)]
    ContextNotSet(#[from] ContextNotSetError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl IsolationError {
    /// Returns `true` for isolation violations and unauthorized escalations.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            IsolationError::Violation(_) | IsolationError::UnauthorizedEscalation { .. }
        )
    }

    /// Returns the violation details, if this is a violation.
    pub fn violation(&self) -> Option<&IsolationViolation> {
        match self {
            IsolationError::Violation(v) => Some(v),
            _ => None,
        }
    }
}

/// Errors raised by the cross-tenant operation manager itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscalationError {
    /// `justification` was empty. This is a programming error.
    #[error("cross-tenant operations require a non-empty justification")]
    MissingJustification,

    /// No prior context to escalate from.
    #[error(transparent)]
    ContextNotSet(#[from] ContextNotSetError),

    /// The escalated operation was cancelled; the prior context was restored.
    #[error("cross-tenant operation cancelled")]
    Cancelled,
}

/// Errors from a [`TenantDirectory`](crate::directory::TenantDirectory).
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory could not be reached.
    #[error("tenant directory unavailable: {message}")]
    Unavailable { message: String },

    /// Internal directory error.
    #[error("tenant directory error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Errors from a [`RecordStore`](crate::store::RecordStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record with the same id already exists.
    #[error("{entity_type}/{id} already exists")]
    AlreadyExists { entity_type: String, id: String },

    /// The backend is currently unavailable.
    #[error("store unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Errors from rendering a tenant scope as SQL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushdownError {
    /// The tenant id falls outside the configured character pattern.
    #[error("tenant id '{tenant_id}' does not match the allowed pattern {pattern}")]
    InvalidTenantId { tenant_id: String, pattern: String },
}

/// Errors reported by an observation sink.
///
/// These never reach the guarded operation; the observer logs and drops them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink's receiving side has gone away.
    #[error("observation sink closed")]
    Closed,

    /// The sink refused the event.
    #[error("observation sink rejected event: {message}")]
    Rejected { message: String },
}

/// Result type alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for guarded data access.
pub type IsolationResult<T> = std::result::Result<T, IsolationError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal {
            backend_name: "unknown".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let v = IsolationViolation::tenant_mismatch(
            ViolationKind::CrossTenantCreate,
            &TenantId::new("a"),
            Some(&TenantId::new("b")),
            "Invoice",
            Some("inv-1"),
        );
        assert_eq!(
            v.to_string(),
            "isolation violation (cross_tenant_create) on Invoice/inv-1: expected tenant a, found b"
        );
    }

    #[test]
    fn test_missing_explicit_tenant_message() {
        let v = IsolationViolation::missing_explicit_tenant("Invoice", None);
        assert!(v.to_string().contains("system context requires explicit tenantId"));
        assert_eq!(v.kind, ViolationKind::MissingExplicitTenant);
    }

    #[test]
    fn test_not_found_display() {
        let err = IsolationError::NotFound {
            entity_type: "Invoice".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(err.to_string(), "Invoice/1 not found");
        assert!(!err.is_violation());
    }

    #[test]
    fn test_is_violation() {
        let err: IsolationError =
            IsolationViolation::missing_explicit_tenant("Invoice", None).into();
        assert!(err.is_violation());
        assert!(err.violation().is_some());

        let err = IsolationError::UnauthorizedEscalation {
            entity_type: "Invoice".to_string(),
            operation: "create".to_string(),
        };
        assert!(err.is_violation());
    }

    #[test]
    fn test_umbrella_conversions() {
        let err: Error = ContextNotSetError.into();
        assert!(matches!(err, Error::ContextNotSet(_)));

        let err: Error = EscalationError::MissingJustification.into();
        assert!(err.to_string().contains("justification"));
    }
}
