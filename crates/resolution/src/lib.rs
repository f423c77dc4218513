//! Palisade tenant resolution
//!
//! This crate answers "which tenant is this request for" at the HTTP
//! boundary. It reduces a request to [`RequestSignals`](signals::RequestSignals),
//! runs a chain of resolution strategies against the tenant directory and
//! installs the resulting [`TenantContext`](palisade_isolation::TenantContext)
//! in a request-scoped holder.
//!
//! # Features
//!
//! - **Strategies**: subdomain, header or query parameter, path segment and
//!   identity claim, combined by an ordered composite
//! - **Domain validation**: claim lists are checked against an independently
//!   resolved tenant so one user's tenants cannot be mixed across URLs
//! - **System-admin bypass**: a configured claim resolves to system context
//! - **Strict consistency**: optionally require every source to agree
//! - **Structured failures**: 400 / 404 / 403 JSON responses, never a
//!   default tenant
//!
//! # Architecture
//!
//! - [`signals`] - The request view resolvers inspect
//! - [`resolver`] - The resolver trait and admin bypass
//! - [`strategy`] - Concrete strategies and the composite
//! - [`validation`] - Domain validation modes and source consistency
//! - [`config`] - Configuration and chain assembly
//! - [`middleware`] - axum middleware and extractor
//! - [`error`] - Resolution errors and their HTTP mapping
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use palisade_isolation::{InMemoryTenantDirectory, TenantId, TenantInfo};
//! use palisade_resolution::{RequestSignals, SubdomainResolver, TenantResolver};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let directory = Arc::new(InMemoryTenantDirectory::with_tenants([
//!     TenantInfo::new(TenantId::new("t-acme"), "Acme", "acme"),
//! ]));
//! let resolver = SubdomainResolver::new(directory);
//!
//! let signals = RequestSignals::new().with_host("acme.app.com");
//! let context = resolver.resolve(&signals, &CancellationToken::new()).await.unwrap();
//! assert_eq!(context.source(), "subdomain:acme");
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod middleware;
pub mod resolver;
pub mod signals;
pub mod source;
pub mod strategy;
pub mod validation;

// Re-export commonly used types at crate root
pub use config::{ResolutionArgs, ResolutionConfig, StrategyKind, build_resolver};
pub use error::{ConfigError, FailureKind, ResolutionError, ResolutionFailure};
pub use middleware::{ResolverState, TenantHolder, resolve_tenant};
pub use resolver::{AdminRoleClaim, SharedResolver, TenantResolver};
pub use signals::{Claim, IdentityClaims, RequestSignals};
pub use source::ResolutionMethod;
pub use strategy::{
    ClaimResolver, CompositeResolver, HeaderResolver, PathResolver, SubdomainResolver,
};
pub use validation::{DomainValidationMode, ResolvedTenant, SourceConsistency};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
