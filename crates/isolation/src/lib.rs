//! Palisade tenant isolation layer
//!
//! This crate enforces data isolation between tenants sharing one
//! application and one data store. It answers "which tenant is requesting
//! data" and makes sure the answer is applied to every read and write.
//!
//! # Features
//!
//! - **Request-scoped context**: a [`ContextHolder`](tenant::ContextHolder) per
//!   request, never a process global; reading an unset holder is an error
//! - **Scoped reads**: every guarded read carries a structured
//!   [`TenantScope`](store::TenantScope) conjoined with the caller's predicate
//! - **Checked writes**: creates are stamped, foreign writes are rejected
//!   as [`IsolationViolation`](error::IsolationViolation)s
//! - **Audited escalation**: system-mode writes only inside
//!   [`CrossTenantManager`](cross_tenant::CrossTenantManager) frames, which
//!   always restore the prior context
//! - **Observation hooks**: query timing, violations and escalations are
//!   reported to an [`ObservationSink`](observe::ObservationSink)
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant ids, contexts, the context holder and the
//!   [`TenantScoped`](tenant::TenantScoped) record trait
//! - [`directory`] - The tenant directory interface
//! - [`store`] - The record store interface, scoped queries and SQL push-down
//! - [`guard`] - The isolation guard
//! - [`cross_tenant`] - Audited cross-tenant escalation
//! - [`observe`] - Audit events, sinks and metrics
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use palisade_isolation::tenant::{ContextHolder, TenantContext, TenantId};
//!
//! // Normally done by the resolver at the request boundary
//! let holder = ContextHolder::new();
//! holder.set(TenantContext::for_tenant(TenantId::new("acme"), "subdomain:acme").unwrap());
//!
//! let context = holder.current().unwrap();
//! assert!(!context.is_system());
//! assert_eq!(context.to_string(), "tenant acme (subdomain:acme)");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cross_tenant;
pub mod directory;
pub mod error;
pub mod guard;
pub mod observe;
pub mod store;
pub mod tenant;

// Re-export commonly used types at crate root
pub use cross_tenant::{CrossTenantManager, CrossTenantScope};
pub use directory::{InMemoryTenantDirectory, TenantDirectory, TenantDirectoryExt, TenantInfo};
pub use error::{
    ContextError, ContextNotSetError, DirectoryError, Error, EscalationError, IsolationError,
    IsolationResult, IsolationViolation, PushdownError, Result, StoreError, ViolationKind,
};
pub use guard::IsolationGuard;
pub use observe::{AuditEvent, ObservationConfig, ObservationSink, Observer};
pub use store::{InMemoryStore, QueryOptions, RecordStore};
pub use tenant::{ContextHolder, TenantContext, TenantId, TenantScoped};

/// Everything needed to define a tenant-scoped record and access it through
/// a guard.
pub mod prelude {
    pub use crate::cross_tenant::{CrossTenantManager, CrossTenantScope};
    pub use crate::directory::{TenantDirectory, TenantDirectoryExt, TenantInfo};
    pub use crate::error::{EscalationError, IsolationError, IsolationResult};
    pub use crate::guard::IsolationGuard;
    pub use crate::observe::Observer;
    pub use crate::store::{InMemoryStore, QueryOptions, RecordStore};
    pub use crate::tenant::{ContextHolder, TenantContext, TenantId, TenantScoped};
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
