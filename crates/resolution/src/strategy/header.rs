//! Header and query-parameter resolution.

use std::sync::Arc;

use async_trait::async_trait;
use palisade_isolation::{TenantContext, TenantDirectory};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{context_for, lookup_id_then_domain};
use crate::error::ResolutionError;
use crate::resolver::{AdminRoleClaim, TenantResolver};
use crate::signals::RequestSignals;
use crate::source::ResolutionMethod;

/// Default header carrying a tenant id or domain key.
pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-ID";

/// Resolves the tenant from configured headers, then query parameters.
///
/// The first non-empty value wins. It is tried as a tenant id first, so a
/// caller sending an id never costs a domain-key lookup, and then as a
/// domain key.
pub struct HeaderResolver {
    directory: Arc<dyn TenantDirectory>,
    header_names: Vec<String>,
    query_params: Vec<String>,
    admin: Option<AdminRoleClaim>,
}

impl HeaderResolver {
    /// Creates a resolver reading `X-Tenant-ID` and no query parameters.
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            header_names: vec![DEFAULT_TENANT_HEADER.to_string()],
            query_params: Vec::new(),
            admin: None,
        }
    }

    /// Replaces the ordered header names. Matching is case-insensitive.
    pub fn with_headers(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.header_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the ordered query parameter names.
    pub fn with_query_params(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query_params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enables the system-admin short-circuit.
    pub fn with_admin_claim(mut self, admin: AdminRoleClaim) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Finds the first non-empty value and the source tag describing it.
    pub fn find_signal(&self, signals: &RequestSignals) -> Option<(String, String)> {
        let from_headers = self.header_names.iter().find_map(|name| {
            non_empty(signals.header(name)).map(|v| (format!("header:{name}"), v.to_string()))
        });
        from_headers.or_else(|| {
            self.query_params.iter().find_map(|name| {
                non_empty(signals.query_param(name)).map(|v| (format!("query:{name}"), v.to_string()))
            })
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
impl TenantResolver for HeaderResolver {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::HeaderOrQuery
    }

    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        self.admin.as_ref()
    }

    #[instrument(skip_all)]
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        let (source, value) = self.find_signal(signals).ok_or_else(|| ResolutionError::NoSignal {
            method: ResolutionMethod::HeaderOrQuery,
            reason: format!(
                "none of headers [{}] or query parameters [{}] present",
                self.header_names.join(", "),
                self.query_params.join(", ")
            ),
        })?;

        match lookup_id_then_domain(self.directory.as_ref(), &value, cancel).await? {
            Some(info) => {
                debug!(%source, tenant_id = %info.id, "Resolved tenant from request header or query");
                context_for(info, source)
            }
            None => Err(ResolutionError::NotFound {
                method: ResolutionMethod::HeaderOrQuery,
                identifier: value,
            }),
        }
    }
}
