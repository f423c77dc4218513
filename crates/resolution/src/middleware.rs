//! Request boundary for axum.
//!
//! [`resolve_tenant`] resolves every inbound request before any handler runs
//! and hands the handler a request-scoped [`ContextHolder`]. Requests that
//! cannot be resolved never reach a handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get, middleware::from_fn_with_state};
//! use palisade_resolution::middleware::{resolve_tenant, ResolverState, TenantHolder};
//!
//! async fn whoami(holder: TenantHolder) -> String {
//!     holder.context().map(|c| c.to_string()).unwrap_or_default()
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .layer(from_fn_with_state(ResolverState::new(resolver), resolve_tenant));
//! ```

use std::ops::Deref;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header::HeaderName, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use palisade_isolation::{ContextHolder, ContextNotSetError, TenantContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::resolver::SharedResolver;
use crate::signals::RequestSignals;

/// Header carrying the caller's correlation id.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Claim naming the authenticated user.
pub const SUBJECT_CLAIM: &str = "sub";

/// Middleware state: the resolver chain.
#[derive(Clone)]
pub struct ResolverState {
    resolver: SharedResolver,
}

impl ResolverState {
    /// Wraps a resolver for use with `from_fn_with_state`.
    pub fn new(resolver: SharedResolver) -> Self {
        Self { resolver }
    }

    /// The wrapped resolver.
    pub fn resolver(&self) -> &SharedResolver {
        &self.resolver
    }
}

impl std::fmt::Debug for ResolverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverState")
            .field("method", &self.resolver.method())
            .finish()
    }
}

/// Middleware function for tenant resolution.
///
/// Use with `axum::middleware::from_fn_with_state`. On success the request
/// carries an `Arc<ContextHolder>` and the request's [`CancellationToken`] as
/// extensions; the token fires if the request future is dropped. On failure
/// the structured error response is returned directly.
pub async fn resolve_tenant(
    State(state): State<ResolverState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let signals = RequestSignals::from_parts(&parts);

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let context = match state.resolver.resolve(&signals, &cancel).await {
        Ok(context) => enrich(context, &parts, &signals),
        Err(err) => {
            warn!(
                error = %err,
                code = err.code(),
                host = signals.host().unwrap_or_default(),
                path = signals.path(),
                "Tenant resolution failed"
            );
            metrics::counter!("palisade_tenant_resolution_failures_total", "code" => err.code())
                .increment(1);
            return err.into_response();
        }
    };

    debug!(%context, "Resolved request tenant");
    parts
        .extensions
        .insert(Arc::new(ContextHolder::with_context(context)));
    parts.extensions.insert(cancel.clone());

    next.run(Request::from_parts(parts, body)).await
}

/// Attaches the correlation id and user id to a resolved context.
fn enrich(context: TenantContext, parts: &Parts, signals: &RequestSignals) -> TenantContext {
    let correlation_id = parts
        .headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = context.with_correlation_id(correlation_id);
    match signals.claim(SUBJECT_CLAIM) {
        Some(user_id) => context.with_user_id(user_id),
        None => context,
    }
}

/// Axum extractor for the request's context holder.
///
/// Rejects with 500 when [`resolve_tenant`] did not run for the route.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(holder: TenantHolder) {
///     let context = holder.context()?;
///     println!("Tenant: {context}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TenantHolder(pub Arc<ContextHolder>);

impl TenantHolder {
    /// Returns a copy of the active context.
    pub fn context(&self) -> Result<TenantContext, ContextNotSetError> {
        self.0.current()
    }

    /// Consumes the extractor and returns the shared holder.
    pub fn into_inner(self) -> Arc<ContextHolder> {
        self.0
    }
}

impl Deref for TenantHolder {
    type Target = ContextHolder;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for TenantHolder
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<ContextHolder>>()
            .cloned()
            .map(TenantHolder)
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Tenant context not resolved for this route",
            ))
    }
}
