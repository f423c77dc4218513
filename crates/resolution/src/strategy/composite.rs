//! Ordered fallback over several resolvers.

use async_trait::async_trait;
use palisade_isolation::TenantContext;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::ResolutionError;
use crate::resolver::{AdminRoleClaim, SharedResolver, TenantResolver};
use crate::signals::RequestSignals;
use crate::source::ResolutionMethod;
use crate::validation::{ResolvedTenant, SourceConsistency};

/// Tries inner resolvers in order; the first success wins.
///
/// Only typed resolution failures fall through to the next resolver. A
/// directory failure or cancellation stops the chain immediately. When every
/// resolver fails, the error lists each attempt in order.
///
/// In strict mode the remaining resolvers also run, and any that resolve a
/// different tenant turn the request into a
/// [`TenantMismatch`](ResolutionError::TenantMismatch).
pub struct CompositeResolver {
    resolvers: Vec<SharedResolver>,
    admin: Option<AdminRoleClaim>,
    strict: bool,
}

impl CompositeResolver {
    /// Creates a composite over `resolvers`, tried in the given order.
    pub fn new(resolvers: impl IntoIterator<Item = SharedResolver>) -> Self {
        Self {
            resolvers: resolvers.into_iter().collect(),
            admin: None,
            strict: false,
        }
    }

    /// Requires every resolver that succeeds to agree on the tenant.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enables the system-admin short-circuit for the whole chain.
    pub fn with_admin_claim(mut self, admin: AdminRoleClaim) -> Self {
        self.admin = Some(admin);
        self
    }

    /// The inner resolvers, in order.
    pub fn resolvers(&self) -> &[SharedResolver] {
        &self.resolvers
    }

    /// Runs every resolver and records each one that produced a tenant.
    ///
    /// Fails with [`AllStrategiesFailed`](ResolutionError::AllStrategiesFailed)
    /// when none did.
    pub async fn resolve_all(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTenant, ResolutionError> {
        let mut failures = Vec::new();
        let mut primary: Option<(ResolutionMethod, TenantContext)> = None;
        let mut all_sources = Vec::new();

        for resolver in &self.resolvers {
            let method = resolver.method();
            match resolver.resolve(signals, cancel).await {
                Ok(context) => {
                    if let Some(tenant_id) = context.tenant_id() {
                        all_sources.push((method, tenant_id.clone()));
                    }
                    if primary.is_none() {
                        primary = Some((method, context));
                    }
                }
                Err(e) => match e.as_failure(method) {
                    Some(failure) => {
                        debug!(%method, reason = %failure.reason, "Resolver failed, trying next");
                        failures.push(failure);
                    }
                    None => return Err(e),
                },
            }
        }

        match primary {
            Some((method, context)) => Ok(ResolvedTenant {
                context,
                method,
                all_sources,
            }),
            None => Err(ResolutionError::AllStrategiesFailed { failures }),
        }
    }

    /// Resolves with every resolver and verifies they agree on the tenant.
    pub async fn validate_consistency(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTenant, ResolutionError> {
        let resolved = self.resolve_all(signals, cancel).await?;
        if let Err(e) = SourceConsistency::validate_consistency(&resolved) {
            warn!(error = %e, "Tenant sources disagree");
            return Err(e);
        }
        Ok(resolved)
    }

    async fn resolve_first(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        let mut failures = Vec::new();

        for resolver in &self.resolvers {
            let method = resolver.method();
            match resolver.resolve(signals, cancel).await {
                Ok(context) => {
                    debug!(%method, source = context.source(), "Composite resolved tenant");
                    return Ok(context);
                }
                Err(e) => match e.as_failure(method) {
                    Some(failure) => {
                        debug!(%method, reason = %failure.reason, "Resolver failed, trying next");
                        failures.push(failure);
                    }
                    None => return Err(e),
                },
            }
        }

        Err(ResolutionError::AllStrategiesFailed { failures })
    }
}

#[async_trait]
impl TenantResolver for CompositeResolver {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Composite
    }

    fn admin_claim(&self) -> Option<&AdminRoleClaim> {
        self.admin.as_ref()
    }

    #[instrument(skip_all, fields(resolvers = self.resolvers.len(), strict = self.strict))]
    async fn resolve_tenant(
        &self,
        signals: &RequestSignals,
        cancel: &CancellationToken,
    ) -> Result<TenantContext, ResolutionError> {
        if self.strict {
            return Ok(self.validate_consistency(signals, cancel).await?.context);
        }
        self.resolve_first(signals, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use palisade_isolation::{DirectoryError, TenantId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Outcome {
        Tenant(&'static str),
        NoSignal,
        Unavailable,
    }

    struct Stub {
        method: ResolutionMethod,
        outcome: Outcome,
        calls: AtomicUsize,
    }

    fn stub(method: ResolutionMethod, outcome: Outcome) -> Arc<Stub> {
        Arc::new(Stub {
            method,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn dyn_stub(method: ResolutionMethod, outcome: Outcome) -> SharedResolver {
        stub(method, outcome)
    }

    fn shared(stub: &Arc<Stub>) -> SharedResolver {
        stub.clone()
    }

    #[async_trait]
    impl TenantResolver for Stub {
        fn method(&self) -> ResolutionMethod {
            self.method
        }

        async fn resolve_tenant(
            &self,
            _signals: &RequestSignals,
            _cancel: &CancellationToken,
        ) -> Result<TenantContext, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Tenant(id) => Ok(TenantContext::for_tenant(
                    TenantId::new(id),
                    format!("{}:{id}", self.method),
                )?),
                Outcome::NoSignal => Err(ResolutionError::NoSignal {
                    method: self.method,
                    reason: "nothing here".to_string(),
                }),
                Outcome::Unavailable => Err(DirectoryError::Unavailable {
                    message: "down".to_string(),
                }
                .into()),
            }
        }
    }

    async fn resolve(composite: &CompositeResolver) -> Result<TenantContext, ResolutionError> {
        composite
            .resolve(&RequestSignals::new(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let failing = stub(ResolutionMethod::Subdomain, Outcome::NoSignal);
        let x = stub(ResolutionMethod::HeaderOrQuery, Outcome::Tenant("x"));
        let y = stub(ResolutionMethod::Claim, Outcome::Tenant("y"));
        let composite = CompositeResolver::new([shared(&failing), shared(&x), shared(&y)]);

        let context = resolve(&composite).await.unwrap();
        assert_eq!(context.tenant_id(), Some(&TenantId::new("x")));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(y.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failed_lists_attempts_in_order() {
        let composite = CompositeResolver::new([
            dyn_stub(ResolutionMethod::Subdomain, Outcome::NoSignal),
            dyn_stub(ResolutionMethod::PathSegment, Outcome::NoSignal),
        ]);

        match resolve(&composite).await {
            Err(ResolutionError::AllStrategiesFailed { failures }) => {
                let methods: Vec<_> = failures.iter().map(|f| f.method).collect();
                assert_eq!(
                    methods,
                    vec![ResolutionMethod::Subdomain, ResolutionMethod::PathSegment]
                );
                assert!(failures.iter().all(|f| f.kind == FailureKind::NoSignal));
            }
            other => panic!("expected AllStrategiesFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_composite_fails() {
        let composite = CompositeResolver::new(Vec::<SharedResolver>::new());
        let err = resolve(&composite).await.unwrap_err();
        assert!(matches!(err, ResolutionError::AllStrategiesFailed { failures } if failures.is_empty()));
    }

    #[tokio::test]
    async fn test_directory_failure_stops_chain() {
        let next = stub(ResolutionMethod::Claim, Outcome::Tenant("x"));
        let composite = CompositeResolver::new([
            dyn_stub(ResolutionMethod::Subdomain, Outcome::Unavailable),
            shared(&next),
        ]);

        let err = resolve(&composite).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Directory(_)));
        assert_eq!(next.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_mode_detects_mismatch() {
        let composite = CompositeResolver::new([
            dyn_stub(ResolutionMethod::Subdomain, Outcome::Tenant("x")),
            dyn_stub(ResolutionMethod::HeaderOrQuery, Outcome::NoSignal),
            dyn_stub(ResolutionMethod::Claim, Outcome::Tenant("y")),
        ])
        .strict(true);

        let err = resolve(&composite).await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::TenantMismatch {
                conflicting_method: ResolutionMethod::Claim,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_strict_mode_agreeing_sources() {
        let composite = CompositeResolver::new([
            dyn_stub(ResolutionMethod::Subdomain, Outcome::NoSignal),
            dyn_stub(ResolutionMethod::HeaderOrQuery, Outcome::Tenant("x")),
            dyn_stub(ResolutionMethod::Claim, Outcome::Tenant("x")),
        ])
        .strict(true);

        let resolved = composite
            .validate_consistency(&RequestSignals::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.method, ResolutionMethod::HeaderOrQuery);
        assert_eq!(resolved.all_sources.len(), 2);
        assert_eq!(
            resolve(&composite).await.unwrap().tenant_id(),
            Some(&TenantId::new("x"))
        );
    }

    #[tokio::test]
    async fn test_nested_composite_failure_falls_through() {
        let inner: SharedResolver = Arc::new(CompositeResolver::new([dyn_stub(
            ResolutionMethod::Subdomain,
            Outcome::NoSignal,
        )]));
        let composite = CompositeResolver::new([
            inner,
            dyn_stub(ResolutionMethod::Claim, Outcome::Tenant("x")),
        ]);
        let context = resolve(&composite).await.unwrap();
        assert_eq!(context.tenant_id(), Some(&TenantId::new("x")));
    }
}
