//! Resolution strategies.
//!
//! | Strategy | Signal | Lookup | Source tag |
//! |----------|--------|--------|------------|
//! | [`SubdomainResolver`] | leading host label | domain key | `subdomain:<key>` |
//! | [`HeaderResolver`] | header, then query parameter | id, then domain key | `header:<name>` / `query:<name>` |
//! | [`PathResolver`] | first path segment | domain key | `path:<key>` |
//! | [`ClaimResolver`] | identity claim | id, then domain key per candidate | `claim:<name>` |
//! | [`CompositeResolver`] | ordered fallback over the above | | inner resolver's tag |

mod claim;
mod composite;
mod header;
mod path;
mod subdomain;

pub use claim::{ClaimResolver, DEFAULT_CLAIM_NAMES};
pub use composite::CompositeResolver;
pub use header::{DEFAULT_TENANT_HEADER, HeaderResolver};
pub use path::{DEFAULT_PATH_EXCLUSIONS, PathResolver};
pub use subdomain::{DEFAULT_SUBDOMAIN_EXCLUSIONS, SubdomainResolver};

use std::future::Future;

use palisade_isolation::{
    DirectoryError, TenantContext, TenantDirectory, TenantDirectoryExt, TenantId, TenantInfo,
};
use tokio_util::sync::CancellationToken;

use crate::error::ResolutionError;

/// Awaits a directory call unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    lookup: impl Future<Output = Result<T, DirectoryError>>,
) -> Result<T, ResolutionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResolutionError::Cancelled),
        result = lookup => Ok(result?),
    }
}

/// Looks `value` up as a tenant id, then as a domain key.
pub(crate) async fn lookup_id_then_domain(
    directory: &dyn TenantDirectory,
    value: &str,
    cancel: &CancellationToken,
) -> Result<Option<TenantInfo>, ResolutionError> {
    if let Some(info) = cancellable(cancel, directory.active_by_id(&TenantId::new(value))).await? {
        return Ok(Some(info));
    }
    cancellable(cancel, directory.active_by_domain(value)).await
}

pub(crate) fn context_for(info: TenantInfo, source: String) -> Result<TenantContext, ResolutionError> {
    Ok(TenantContext::for_tenant(info.id, source)?)
}

/// Lowercases an exclusion list once so matching can compare directly.
pub(crate) fn normalize_exclusions(exclusions: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    exclusions
        .into_iter()
        .map(|e| e.into().trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
