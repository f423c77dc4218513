//! Resolver configuration.
//!
//! [`ResolutionConfig`] describes the resolver chain: which strategies run, in
//! what order, and the knobs each strategy reads. It deserializes from any
//! serde format, or comes from the command line and environment through
//! [`ResolutionArgs`].
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PALISADE_STRATEGIES` | subdomain,header,claim | Strategy order |
//! | `PALISADE_TENANT_HEADERS` | X-Tenant-ID | Headers carrying a tenant |
//! | `PALISADE_TENANT_QUERY_PARAMS` | tenant,tenantId | Query parameters carrying a tenant |
//! | `PALISADE_SUBDOMAIN_EXCLUSIONS` | www,api,admin | Host labels that are never tenants |
//! | `PALISADE_PATH_EXCLUSIONS` | api,admin | Path segments that are never tenants |
//! | `PALISADE_TENANT_CLAIMS` | tenant_id,tenants | Claims carrying tenants |
//! | `PALISADE_DOMAIN_VALIDATION` | none | Anchor for claim validation |
//! | `PALISADE_ADMIN_CLAIM` | (unset) | `type=value` claim granting system context |
//! | `PALISADE_STRICT_CONSISTENCY` | false | Require all sources to agree |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use palisade_isolation::InMemoryTenantDirectory;
//! use palisade_resolution::config::{build_resolver, ResolutionConfig, StrategyKind};
//!
//! let config = ResolutionConfig {
//!     strategies: vec![StrategyKind::Header, StrategyKind::Path],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! let resolver = build_resolver(&config, Arc::new(InMemoryTenantDirectory::new())).unwrap();
//! ```

use std::sync::Arc;

use clap::Parser;
use palisade_isolation::TenantDirectory;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::resolver::{AdminRoleClaim, SharedResolver};
use crate::strategy::{
    ClaimResolver, CompositeResolver, DEFAULT_CLAIM_NAMES, DEFAULT_PATH_EXCLUSIONS,
    DEFAULT_SUBDOMAIN_EXCLUSIONS, DEFAULT_TENANT_HEADER, HeaderResolver, PathResolver,
    SubdomainResolver,
};
use crate::validation::DomainValidationMode;

/// A resolution strategy that can appear in the chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Leading host label.
    Subdomain,
    /// Header, then query parameter.
    Header,
    /// First path segment.
    Path,
    /// Identity claim.
    Claim,
}

/// Configuration of the resolver chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Strategies in the order they are tried.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    /// Ordered header names read by the header strategy.
    #[serde(default = "default_header_names")]
    pub header_names: Vec<String>,

    /// Ordered query parameter names read after the headers.
    #[serde(default = "default_query_params")]
    pub query_params: Vec<String>,

    /// Host labels that never name a tenant.
    #[serde(default = "default_subdomain_exclusions")]
    pub subdomain_exclusions: Vec<String>,

    /// Path segments that never name a tenant.
    #[serde(default = "default_path_exclusions")]
    pub path_exclusions: Vec<String>,

    /// Ordered claim names read by the claim strategy.
    #[serde(default = "default_claim_names")]
    pub claim_names: Vec<String>,

    /// Anchor the claim strategy validates candidates against.
    #[serde(default)]
    pub domain_validation: DomainValidationMode,

    /// Claim granting system context, bypassing every strategy.
    #[serde(default)]
    pub admin_role_claim: Option<AdminRoleClaim>,

    /// Require every strategy that resolves to agree on the tenant.
    #[serde(default)]
    pub strict_consistency: bool,
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Subdomain, StrategyKind::Header, StrategyKind::Claim]
}

fn default_header_names() -> Vec<String> {
    vec![DEFAULT_TENANT_HEADER.to_string()]
}

fn default_query_params() -> Vec<String> {
    vec!["tenant".to_string(), "tenantId".to_string()]
}

fn default_subdomain_exclusions() -> Vec<String> {
    to_strings(DEFAULT_SUBDOMAIN_EXCLUSIONS)
}

fn default_path_exclusions() -> Vec<String> {
    to_strings(DEFAULT_PATH_EXCLUSIONS)
}

fn default_claim_names() -> Vec<String> {
    to_strings(DEFAULT_CLAIM_NAMES)
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            header_names: default_header_names(),
            query_params: default_query_params(),
            subdomain_exclusions: default_subdomain_exclusions(),
            path_exclusions: default_path_exclusions(),
            claim_names: default_claim_names(),
            domain_validation: DomainValidationMode::None,
            admin_role_claim: None,
            strict_consistency: false,
        }
    }
}

impl ResolutionConfig {
    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.strategies.is_empty() {
            errors.push("At least one resolution strategy is required".to_string());
        }

        for (i, kind) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(kind) {
                errors.push(format!("Strategy {kind:?} is listed more than once"));
            }
        }

        if self.strategies.contains(&StrategyKind::Header)
            && self.header_names.is_empty()
            && self.query_params.is_empty()
        {
            errors.push("Header strategy needs at least one header or query parameter".to_string());
        }

        if self.strategies.contains(&StrategyKind::Claim) && self.claim_names.is_empty() {
            errors.push("Claim strategy needs at least one claim name".to_string());
        }

        if self.domain_validation != DomainValidationMode::None
            && !self.strategies.contains(&StrategyKind::Claim)
        {
            errors.push("Domain validation only applies to the claim strategy".to_string());
        }

        let blank = |values: &[String]| values.iter().any(|v| v.trim().is_empty());
        if blank(&self.header_names) || blank(&self.query_params) || blank(&self.claim_names) {
            errors.push("Header, query parameter and claim names cannot be empty".to_string());
        }

        if let Some(admin) = &self.admin_role_claim {
            if admin.claim_type.trim().is_empty() || admin.value.trim().is_empty() {
                errors.push("Admin role claim needs both a type and a value".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Runs every strategy, with a `role=system-admin` admin claim.
    pub fn for_testing() -> Self {
        Self {
            strategies: vec![
                StrategyKind::Subdomain,
                StrategyKind::Header,
                StrategyKind::Path,
                StrategyKind::Claim,
            ],
            admin_role_claim: Some(AdminRoleClaim::new("role", "system-admin")),
            ..Default::default()
        }
    }
}

/// Command-line and environment form of [`ResolutionConfig`].
#[derive(Debug, Clone, Parser)]
#[command(name = "palisade")]
#[command(about = "Tenant resolution settings")]
pub struct ResolutionArgs {
    /// Strategies in the order they are tried.
    #[arg(
        long,
        env = "PALISADE_STRATEGIES",
        value_enum,
        value_delimiter = ',',
        default_values = ["subdomain", "header", "claim"]
    )]
    pub strategies: Vec<StrategyKind>,

    /// Headers carrying a tenant id or domain key.
    #[arg(
        long = "tenant-header",
        env = "PALISADE_TENANT_HEADERS",
        value_delimiter = ',',
        default_value = "X-Tenant-ID"
    )]
    pub header_names: Vec<String>,

    /// Query parameters carrying a tenant id or domain key.
    #[arg(
        long = "tenant-query-param",
        env = "PALISADE_TENANT_QUERY_PARAMS",
        value_delimiter = ',',
        default_values = ["tenant", "tenantId"]
    )]
    pub query_params: Vec<String>,

    /// Host labels that never name a tenant.
    #[arg(
        long,
        env = "PALISADE_SUBDOMAIN_EXCLUSIONS",
        value_delimiter = ',',
        default_values = ["www", "api", "admin"]
    )]
    pub subdomain_exclusions: Vec<String>,

    /// Path segments that never name a tenant.
    #[arg(
        long,
        env = "PALISADE_PATH_EXCLUSIONS",
        value_delimiter = ',',
        default_values = ["api", "admin"]
    )]
    pub path_exclusions: Vec<String>,

    /// Claims carrying a tenant or tenant list.
    #[arg(
        long = "tenant-claim",
        env = "PALISADE_TENANT_CLAIMS",
        value_delimiter = ',',
        default_values = ["tenant_id", "tenants"]
    )]
    pub claim_names: Vec<String>,

    /// Anchor the claim strategy validates candidates against.
    #[arg(long, env = "PALISADE_DOMAIN_VALIDATION", value_enum, default_value = "none")]
    pub domain_validation: DomainValidationMode,

    /// Claim granting system context, as `type=value`.
    #[arg(long, env = "PALISADE_ADMIN_CLAIM", value_parser = parse_admin_claim)]
    pub admin_claim: Option<AdminRoleClaim>,

    /// Require every strategy that resolves to agree on the tenant.
    #[arg(long, env = "PALISADE_STRICT_CONSISTENCY", default_value = "false")]
    pub strict_consistency: bool,
}

fn parse_admin_claim(value: &str) -> Result<AdminRoleClaim, String> {
    match value.split_once('=') {
        Some((claim_type, claim_value)) if !claim_type.is_empty() && !claim_value.is_empty() => {
            Ok(AdminRoleClaim::new(claim_type, claim_value))
        }
        _ => Err(format!("expected type=value, got '{value}'")),
    }
}

impl From<ResolutionArgs> for ResolutionConfig {
    fn from(args: ResolutionArgs) -> Self {
        Self {
            strategies: args.strategies,
            header_names: args.header_names,
            query_params: args.query_params,
            subdomain_exclusions: args.subdomain_exclusions,
            path_exclusions: args.path_exclusions,
            claim_names: args.claim_names,
            domain_validation: args.domain_validation,
            admin_role_claim: args.admin_claim,
            strict_consistency: args.strict_consistency,
        }
    }
}

/// Assembles the resolver chain described by `config`.
///
/// The chain is always a [`CompositeResolver`], so failures report every
/// attempted strategy. The admin claim, when configured, is checked once by
/// the composite before any strategy runs.
pub fn build_resolver(
    config: &ResolutionConfig,
    directory: Arc<dyn TenantDirectory>,
) -> Result<SharedResolver, ConfigError> {
    config
        .validate()
        .map_err(|problems| ConfigError { problems })?;

    let subdomain = || -> SharedResolver {
        Arc::new(
            SubdomainResolver::new(directory.clone())
                .with_exclusions(config.subdomain_exclusions.iter().cloned()),
        )
    };
    let header = || -> SharedResolver {
        Arc::new(
            HeaderResolver::new(directory.clone())
                .with_headers(config.header_names.iter().cloned())
                .with_query_params(config.query_params.iter().cloned()),
        )
    };
    let path = || -> SharedResolver {
        Arc::new(
            PathResolver::new(directory.clone())
                .with_exclusions(config.path_exclusions.iter().cloned()),
        )
    };

    let mut resolvers = Vec::with_capacity(config.strategies.len());
    for kind in &config.strategies {
        let resolver = match kind {
            StrategyKind::Subdomain => subdomain(),
            StrategyKind::Header => header(),
            StrategyKind::Path => path(),
            StrategyKind::Claim => {
                let claim = ClaimResolver::new(directory.clone())
                    .with_claim_names(config.claim_names.iter().cloned());
                let claim = match config.domain_validation {
                    DomainValidationMode::None => claim,
                    mode @ DomainValidationMode::ValidateAgainstSubdomain => {
                        claim.with_domain_validation(mode, subdomain())?
                    }
                    mode @ DomainValidationMode::ValidateAgainstPath => {
                        claim.with_domain_validation(mode, path())?
                    }
                    mode @ DomainValidationMode::ValidateAgainstHeaderOrQuery => {
                        claim.with_domain_validation(mode, header())?
                    }
                };
                Arc::new(claim) as SharedResolver
            }
        };
        resolvers.push(resolver);
    }

    let mut composite =
        CompositeResolver::new(resolvers).strict(config.strict_consistency);
    if let Some(admin) = &config.admin_role_claim {
        composite = composite.with_admin_claim(admin.clone());
    }
    Ok(Arc::new(composite))
}
