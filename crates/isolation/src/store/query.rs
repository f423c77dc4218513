//! Tenant-scoped queries handed to record stores.

use std::fmt;
use std::sync::Arc;

use crate::tenant::{TenantContext, TenantId, TenantScoped};

/// The tenant portion of a query.
///
/// Kept structured (rather than folded into the caller's closure) so stores
/// can push it down into native filtering, e.g. a `tenant_id = $1` clause or
/// a row-level-security session setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Only records owned by this tenant are visible.
    Tenant(TenantId),
    /// Every record is visible (system context).
    Unrestricted,
}

impl TenantScope {
    /// Derives the scope from a context.
    pub fn for_context(context: &TenantContext) -> Self {
        match context.tenant_id() {
            Some(id) => TenantScope::Tenant(id.clone()),
            None => TenantScope::Unrestricted,
        }
    }

    /// Returns `true` if a record owned by `owner` is inside the scope.
    pub fn admits(&self, owner: Option<&TenantId>) -> bool {
        match self {
            TenantScope::Unrestricted => true,
            TenantScope::Tenant(id) => owner.is_some_and(|owner| owner == id),
        }
    }

    /// Returns `true` unless the scope is unrestricted.
    pub fn is_filtered(&self) -> bool {
        matches!(self, TenantScope::Tenant(_))
    }

    /// Returns the tenant this scope is restricted to.
    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            TenantScope::Tenant(id) => Some(id),
            TenantScope::Unrestricted => None,
        }
    }
}

/// A caller-supplied record predicate.
///
/// Opaque to SQL-backed stores; in-memory stores evaluate it directly.
pub struct Predicate<R>(Arc<dyn Fn(&R) -> bool + Send + Sync>);

impl<R> Predicate<R> {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluates the predicate.
    pub fn matches(&self, record: &R) -> bool {
        (self.0)(record)
    }
}

impl<R: 'static> Predicate<R> {
    /// Logical AND with another predicate; `self` is evaluated first.
    pub fn and(self, other: Predicate<R>) -> Predicate<R> {
        Predicate::new(move |r| self.matches(r) && other.matches(r))
    }
}

impl<R> Clone for Predicate<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> fmt::Debug for Predicate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// A caller-supplied in-place mutation used by bulk updates.
pub struct Mutation<R>(Arc<dyn Fn(&mut R) + Send + Sync>);

impl<R> Mutation<R> {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&mut R) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Applies the mutation.
    pub fn apply(&self, record: &mut R) {
        (self.0)(record)
    }
}

impl<R> Clone for Mutation<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> fmt::Debug for Mutation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutation(..)")
    }
}

/// Paging and filtering options for ad-hoc guarded queries.
#[derive(Debug, Clone)]
pub struct QueryOptions<R> {
    /// Optional caller predicate.
    pub filter: Option<Predicate<R>>,
    /// Number of matching records to skip.
    pub offset: usize,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl<R> Default for QueryOptions<R> {
    fn default() -> Self {
        Self {
            filter: None,
            offset: 0,
            limit: None,
        }
    }
}

impl<R> QueryOptions<R> {
    /// Creates options with no filter and no paging.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caller predicate.
    pub fn with_filter(mut self, f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Predicate::new(f));
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A query whose tenant scope is fixed at construction.
///
/// Only the isolation guard creates these for caller traffic, so code that
/// goes through the guard cannot widen the scope. The store must evaluate the
/// scope and the caller predicate as one conjunction, scope first.
#[derive(Debug, Clone)]
pub struct ScopedQuery<R> {
    scope: TenantScope,
    record_id: Option<String>,
    filter: Option<Predicate<R>>,
    offset: usize,
    limit: Option<usize>,
}

impl<R: TenantScoped> ScopedQuery<R> {
    /// Creates a query that matches every record in `scope`.
    pub fn new(scope: TenantScope) -> Self {
        Self {
            scope,
            record_id: None,
            filter: None,
            offset: 0,
            limit: None,
        }
    }

    /// Restricts the query to a single record id.
    pub fn with_record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Conjoins a caller predicate.
    pub fn with_filter(mut self, filter: Predicate<R>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Applies paging from [`QueryOptions`].
    pub fn with_options(mut self, options: QueryOptions<R>) -> Self {
        if let Some(filter) = options.filter {
            self = self.with_filter(filter);
        }
        self.offset = options.offset;
        self.limit = options.limit;
        self
    }

    /// Returns the tenant scope.
    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Returns the record id restriction, if any.
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    /// Returns `true` if a caller predicate is attached.
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Returns the offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the limit.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Evaluates the full conjunction `scope AND id AND predicate` on a record.
    ///
    /// The tenant scope is checked first; the caller predicate never sees
    /// records outside the scope.
    pub fn matches(&self, record: &R) -> bool {
        if !self.scope.admits(record.tenant_id()) {
            return false;
        }
        if let Some(id) = &self.record_id {
            if record.record_id() != id {
                return false;
            }
        }
        self.filter.as_ref().is_none_or(|f| f.matches(record))
    }
}
