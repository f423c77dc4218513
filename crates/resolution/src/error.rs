//! Error types for tenant resolution.
//!
//! Resolution failures are recoverable by the caller: the request boundary
//! turns them into structured 4xx responses. No failure ever falls back to a
//! default tenant.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use palisade_isolation::{ContextError, DirectoryError, TenantId};
use serde::Serialize;
use thiserror::Error;

use crate::source::ResolutionMethod;

/// Why one strategy failed to produce a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request carried no usable signal for the strategy.
    NoSignal,
    /// The signal named no active tenant.
    NotFound,
    /// Claimed tenants did not match the independently resolved tenant.
    DomainMismatch,
}

impl FailureKind {
    /// The HTTP status the boundary reports for this kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FailureKind::NoSignal => StatusCode::BAD_REQUEST,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::DomainMismatch => StatusCode::FORBIDDEN,
        }
    }
}

/// One failed attempt recorded by a composite resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    pub method: ResolutionMethod,
    pub kind: FailureKind,
    pub attempted_identifier: Option<String>,
    pub reason: String,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attempted_identifier {
            Some(id) => write!(f, "{} ('{}'): {}", self.method, id, self.reason),
            None => write!(f, "{}: {}", self.method, self.reason),
        }
    }
}

/// Errors produced while resolving a tenant from request signals.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("no tenant signal for {method} resolution: {reason}")]
    NoSignal {
        method: ResolutionMethod,
        reason: String,
    },

    #[error("tenant '{identifier}' not found or inactive ({method})")]
    NotFound {
        method: ResolutionMethod,
        identifier: String,
    },

    #[error("claimed tenants [{}] do not match the request domain tenant {}", .claimed.join(", "), .request_tenant.as_ref().map(TenantId::as_str).unwrap_or("<unresolved>"))]
    DomainMismatch {
        method: ResolutionMethod,
        claimed: Vec<String>,
        request_tenant: Option<TenantId>,
    },

    #[error("all tenant resolution strategies failed: [{}]", .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    AllStrategiesFailed { failures: Vec<ResolutionFailure> },

    /// Strict consistency: two strategies resolved different tenants.
    #[error("tenant mismatch: {primary_tenant} from {primary_method} conflicts with {conflicting_tenant} from {conflicting_method}")]
    TenantMismatch {
        primary_tenant: TenantId,
        primary_method: ResolutionMethod,
        conflicting_tenant: TenantId,
        conflicting_method: ResolutionMethod,
    },

    /// The tenant directory failed. Not a resolution outcome; never falls
    /// through to the next strategy.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("tenant resolution cancelled")]
    Cancelled,
}

impl ResolutionError {
    /// Converts a typed resolution outcome into a failure record.
    ///
    /// Returns `None` for errors that are not resolution outcomes (directory
    /// failures, context errors, cancellation, strict-mode mismatches); those
    /// must propagate instead of falling through to the next strategy.
    pub fn as_failure(&self, method: ResolutionMethod) -> Option<ResolutionFailure> {
        let (kind, attempted_identifier) = match self {
            ResolutionError::NoSignal { .. } => (FailureKind::NoSignal, None),
            ResolutionError::NotFound { identifier, .. } => {
                (FailureKind::NotFound, Some(identifier.clone()))
            }
            ResolutionError::DomainMismatch { claimed, .. } => {
                (FailureKind::DomainMismatch, Some(claimed.join(",")))
            }
            ResolutionError::AllStrategiesFailed { failures } => (dominant_kind(failures), None),
            _ => return None,
        };
        Some(ResolutionFailure {
            method,
            kind,
            attempted_identifier,
            reason: self.to_string(),
        })
    }

    /// Returns `true` if this error is a typed resolution outcome.
    pub fn is_resolution_failure(&self) -> bool {
        self.as_failure(ResolutionMethod::Composite).is_some()
    }

    /// The HTTP status the request boundary reports.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResolutionError::NoSignal { .. } => StatusCode::BAD_REQUEST,
            ResolutionError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResolutionError::DomainMismatch { .. } => StatusCode::FORBIDDEN,
            ResolutionError::AllStrategiesFailed { failures } => {
                dominant_kind(failures).status_code()
            }
            ResolutionError::TenantMismatch { .. } => StatusCode::BAD_REQUEST,
            ResolutionError::Directory(_) | ResolutionError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ResolutionError::Context(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::NoSignal { .. } => "tenant-signal-missing",
            ResolutionError::NotFound { .. } => "tenant-not-found",
            ResolutionError::DomainMismatch { .. } => "tenant-domain-mismatch",
            ResolutionError::AllStrategiesFailed { .. } => "tenant-unresolved",
            ResolutionError::TenantMismatch { .. } => "tenant-mismatch",
            ResolutionError::Directory(_) => "tenant-directory-unavailable",
            ResolutionError::Context(_) => "tenant-context-invalid",
            ResolutionError::Cancelled => "cancelled",
        }
    }
}

/// The most specific kind among `failures`: a domain mismatch outranks a
/// miss, which outranks a missing signal.
fn dominant_kind(failures: &[ResolutionFailure]) -> FailureKind {
    failures
        .iter()
        .map(|f| f.kind)
        .max_by_key(|kind| match kind {
            FailureKind::NoSignal => 0,
            FailureKind::NotFound => 1,
            FailureKind::DomainMismatch => 2,
        })
        .unwrap_or(FailureKind::NoSignal)
}

impl IntoResponse for ResolutionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let failures = match &self {
            ResolutionError::AllStrategiesFailed { failures } => failures.clone(),
            _ => Vec::new(),
        };
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "failures": failures,
        });
        (status, Json(body)).into_response()
    }
}

/// Invalid resolver configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tenant resolution configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: FailureKind) -> ResolutionFailure {
        ResolutionFailure {
            method: ResolutionMethod::Subdomain,
            kind,
            attempted_identifier: None,
            reason: "x".to_string(),
        }
    }

    #[test]
    fn test_status_codes() {
        let no_signal = ResolutionError::NoSignal {
            method: ResolutionMethod::HeaderOrQuery,
            reason: "no header".to_string(),
        };
        assert_eq!(no_signal.status_code(), StatusCode::BAD_REQUEST);

        let not_found = ResolutionError::NotFound {
            method: ResolutionMethod::Subdomain,
            identifier: "initech".to_string(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let mismatch = ResolutionError::DomainMismatch {
            method: ResolutionMethod::Claim,
            claimed: vec!["acme".to_string()],
            request_tenant: Some(TenantId::new("t-initech")),
        };
        assert_eq!(mismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ResolutionError::Cancelled.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_aggregate_status_uses_most_specific_failure() {
        let err = ResolutionError::AllStrategiesFailed {
            failures: vec![failure(FailureKind::NoSignal), failure(FailureKind::NotFound)],
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ResolutionError::AllStrategiesFailed {
            failures: vec![failure(FailureKind::NoSignal)],
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ResolutionError::AllStrategiesFailed { failures: vec![] };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_only_typed_outcomes_are_failures() {
        let not_found = ResolutionError::NotFound {
            method: ResolutionMethod::Subdomain,
            identifier: "initech".to_string(),
        };
        let failure = not_found.as_failure(ResolutionMethod::Subdomain).unwrap();
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(failure.attempted_identifier.as_deref(), Some("initech"));

        let directory: ResolutionError = DirectoryError::Unavailable {
            message: "timeout".to_string(),
        }
        .into();
        assert!(!directory.is_resolution_failure());
        assert!(!ResolutionError::Cancelled.is_resolution_failure());
    }

    #[test]
    fn test_display() {
        let err = ResolutionError::AllStrategiesFailed {
            failures: vec![ResolutionFailure {
                method: ResolutionMethod::HeaderOrQuery,
                kind: FailureKind::NotFound,
                attempted_identifier: Some("zzz".to_string()),
                reason: "tenant 'zzz' not found or inactive (header_or_query)".to_string(),
            }],
        };
        assert!(err.to_string().contains("header_or_query ('zzz')"));
    }
}
