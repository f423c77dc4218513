//! Tenant identity types.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier
//! - [`TenantContext`] - Immutable "who is asking" value: one tenant or system mode
//! - [`ContextHolder`] - Request-scoped slot holding the active context
//! - [`TenantScoped`] - Capability every tenant-isolated record type implements
//!
//! # Design Philosophy
//!
//! There is no process-wide "current tenant". Each request owns a
//! `ContextHolder`; anything that fans out to sub-tasks clones the
//! `TenantContext` value instead of sharing the holder.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use palisade_isolation::tenant::{ContextHolder, TenantContext, TenantId};
//!
//! let holder = Arc::new(ContextHolder::new());
//! holder.set(TenantContext::for_tenant(TenantId::new("acme"), "subdomain:acme").unwrap());
//!
//! // Hand a copy to a worker instead of the holder itself.
//! let ctx = holder.current().unwrap();
//! let worker_ctx = ctx.clone();
//! assert_eq!(worker_ctx, ctx);
//! ```

mod context;
mod holder;
mod id;
mod record;

pub use context::TenantContext;
pub use holder::{ContextHolder, EscalationRecord};
pub(crate) use holder::Slot;
pub use id::TenantId;
pub use record::TenantScoped;
