//! Tenant isolation guard.
//!
//! The [`IsolationGuard`] is the data-access front door. Every read is scoped
//! to the active tenant, every write is checked against it, and every
//! system-mode write must happen inside an audited cross-tenant escalation.
//!
//! # Isolation rules
//!
//! | Operation | Tenant context | System context |
//! |-----------|----------------|----------------|
//! | reads | own records only | all records |
//! | create | stamps own id; other id is a violation | explicit id required, escalation required |
//! | update / delete | own records only; foreign is a violation | any record, escalation required |
//! | bulk update / delete | own records only, owner pinned | all records, escalation required |
//!
//! Reads hide foreign records (`NotFound` / empty results). Writes against a
//! foreign record reveal the mismatch as an [`IsolationViolation`].

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::error::{
    IsolationError, IsolationResult, IsolationViolation, StoreResult, ViolationKind,
};
use crate::observe::{Observer, QueryKind, QuerySample};
use crate::store::{Mutation, Predicate, QueryOptions, RecordStore, ScopedQuery, TenantScope};
use crate::tenant::{ContextHolder, TenantContext, TenantScoped};

/// Scoped data access for one record type within one request.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use palisade_isolation::prelude::*;
/// # #[derive(Clone)]
/// # struct Invoice { id: String, tenant: TenantId }
/// # impl TenantScoped for Invoice {
/// #     const ENTITY_TYPE: &'static str = "Invoice";
/// #     fn record_id(&self) -> &str { &self.id }
/// #     fn tenant_id(&self) -> Option<&TenantId> { self.tenant.non_empty() }
/// #     fn assign_tenant(&mut self, t: TenantId) { self.tenant = t; }
/// # }
/// # async fn example() -> IsolationResult<()> {
/// let holder = Arc::new(ContextHolder::with_context(
///     TenantContext::for_tenant(TenantId::new("acme"), "header:X-Tenant-ID").unwrap(),
/// ));
/// let store = Arc::new(InMemoryStore::<Invoice>::new());
/// let guard = IsolationGuard::new(store, holder, Observer::default());
///
/// let invoice = guard
///     .create(Invoice { id: "inv-1".into(), tenant: TenantId::new("") })
///     .await?;
/// assert_eq!(invoice.tenant.as_str(), "acme");
/// # Ok(())
/// # }
/// ```
pub struct IsolationGuard<R, S> {
    store: Arc<S>,
    holder: Arc<ContextHolder>,
    observer: Observer,
    cancel: CancellationToken,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> Clone for IsolationGuard<R, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            holder: Arc::clone(&self.holder),
            observer: self.observer.clone(),
            cancel: self.cancel.clone(),
            _record: PhantomData,
        }
    }
}

impl<R, S> std::fmt::Debug for IsolationGuard<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationGuard")
            .field("holder", &self.holder)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<R, S> IsolationGuard<R, S>
where
    R: TenantScoped,
    S: RecordStore<R>,
{
    /// Creates a guard over `store` for the request owning `holder`.
    pub fn new(store: Arc<S>, holder: Arc<ContextHolder>, observer: Observer) -> Self {
        Self {
            store,
            holder,
            observer,
            cancel: CancellationToken::new(),
            _record: PhantomData,
        }
    }

    /// Ties every operation to `token`; a cancelled token fails pending and
    /// future operations with [`IsolationError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the context holder.
    pub fn holder(&self) -> &Arc<ContextHolder> {
        &self.holder
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Loads a record by id if the active tenant may see it.
    ///
    /// A missing record and a record owned by another tenant both yield
    /// `Ok(None)`.
    #[instrument(skip(self), fields(entity_type = R::ENTITY_TYPE))]
    pub async fn get_by_id(&self, id: &str) -> IsolationResult<Option<R>> {
        let context = self.context()?;
        let query = self
            .scoped(&context)
            .with_record_id(id)
            .with_options(QueryOptions::new().with_limit(1));

        let started = Instant::now();
        let record = self.run(self.store.fetch(&query)).await?.into_iter().next();
        self.observe(&context, QueryKind::GetById, started, usize::from(record.is_some()));
        Ok(record)
    }

    /// Like [`get_by_id`](Self::get_by_id) but fails with
    /// [`IsolationError::NotFound`] when nothing is visible.
    pub async fn require_by_id(&self, id: &str) -> IsolationResult<R> {
        self.get_by_id(id).await?.ok_or_else(|| not_found::<R>(id))
    }

    /// Returns every record visible to the active tenant.
    #[instrument(skip(self), fields(entity_type = R::ENTITY_TYPE))]
    pub async fn get_all(&self) -> IsolationResult<Vec<R>> {
        self.fetch(QueryKind::GetAll, |q| q).await
    }

    /// Returns the visible records matching `predicate`.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE))]
    pub async fn find<P>(&self, predicate: P) -> IsolationResult<Vec<R>>
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.fetch(QueryKind::Find, |q| q.with_filter(Predicate::new(predicate)))
            .await
    }

    /// Counts the visible records matching `predicate`.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE))]
    pub async fn count<P>(&self, predicate: P) -> IsolationResult<usize>
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let context = self.context()?;
        let query = self.scoped(&context).with_filter(Predicate::new(predicate));

        let started = Instant::now();
        let count = self.run(self.store.count(&query)).await?;
        self.observe(&context, QueryKind::Count, started, count);
        Ok(count)
    }

    /// Returns `true` if any visible record matches `predicate`.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE))]
    pub async fn any<P>(&self, predicate: P) -> IsolationResult<bool>
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let found = self
            .fetch(QueryKind::Any, |q| {
                q.with_options(QueryOptions::new().with_limit(1))
                    .with_filter(Predicate::new(predicate))
            })
            .await?;
        Ok(!found.is_empty())
    }

    /// Runs an ad-hoc query with an optional filter and paging.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE, offset = options.offset, limit = ?options.limit))]
    pub async fn query(&self, options: QueryOptions<R>) -> IsolationResult<Vec<R>> {
        self.fetch(QueryKind::Query, |q| q.with_options(options)).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Persists a new record.
    ///
    /// In a tenant context an unowned record is stamped with the active
    /// tenant and a record stamped for another tenant is rejected. In system
    /// context the record must carry an explicit owner and the holder must be
    /// escalated.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE, id = %record.record_id()))]
    pub async fn create(&self, mut record: R) -> IsolationResult<R> {
        let context = self.context()?;
        match context.tenant_id() {
            None => {
                self.require_escalation(&context, "create")?;
                if record.tenant_id().is_none() {
                    return Err(self.violation(
                        &context,
                        IsolationViolation::missing_explicit_tenant(
                            R::ENTITY_TYPE,
                            Some(record.record_id()),
                        ),
                    ));
                }
            }
            Some(tenant_id) => match record.tenant_id() {
                None => record.assign_tenant(tenant_id.clone()),
                Some(owner) if owner != tenant_id => {
                    let violation = IsolationViolation::tenant_mismatch(
                        ViolationKind::CrossTenantCreate,
                        tenant_id,
                        Some(owner),
                        R::ENTITY_TYPE,
                        Some(record.record_id()),
                    );
                    return Err(self.violation(&context, violation));
                }
                Some(_) => {}
            },
        }

        let created = self.run(self.store.insert(record)).await?;
        debug!(
            tenant_id = created.tenant_id().map(|t| t.as_str()).unwrap_or_default(),
            "Created record"
        );
        Ok(created)
    }

    /// Replaces an existing record.
    ///
    /// A tenant context may only update records it owns and may not
    /// re-stamp them to another tenant. An unowned incoming record keeps the
    /// stored owner.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE, id = %record.record_id()))]
    pub async fn update(&self, mut record: R) -> IsolationResult<R> {
        let context = self.context()?;
        self.require_escalation(&context, "update")?;

        let id = record.record_id().to_string();
        let existing = self
            .run(self.store.load(&id))
            .await?
            .ok_or_else(|| not_found::<R>(&id))?;

        if let Some(tenant_id) = context.tenant_id() {
            self.check_owner(&context, &existing)?;
            match record.tenant_id() {
                Some(incoming) if incoming != tenant_id => {
                    let violation = IsolationViolation::tenant_mismatch(
                        ViolationKind::CrossTenantReassignment,
                        tenant_id,
                        Some(incoming),
                        R::ENTITY_TYPE,
                        Some(&id),
                    );
                    return Err(self.violation(&context, violation));
                }
                Some(_) => {}
                None => record.assign_tenant(tenant_id.clone()),
            }
        } else if record.tenant_id().is_none() {
            if let Some(owner) = existing.tenant_id() {
                record.assign_tenant(owner.clone());
            }
        }

        // The record may have been removed between load and replace.
        self.run(self.store.replace(record))
            .await?
            .ok_or_else(|| not_found::<R>(&id))
    }

    /// Deletes a record by id.
    #[instrument(skip(self), fields(entity_type = R::ENTITY_TYPE))]
    pub async fn delete(&self, id: &str) -> IsolationResult<()> {
        let context = self.context()?;
        self.require_escalation(&context, "delete")?;

        let existing = self
            .run(self.store.load(id))
            .await?
            .ok_or_else(|| not_found::<R>(id))?;
        if context.tenant_id().is_some() {
            self.check_owner(&context, &existing)?;
        }

        if self.run(self.store.remove(id)).await? {
            debug!("Deleted record");
            Ok(())
        } else {
            Err(not_found::<R>(id))
        }
    }

    /// Applies `mutation` to every visible record matching `predicate`.
    ///
    /// The owner of each record is pinned: whatever the mutation does to the
    /// tenant field, records keep their owner.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE))]
    pub async fn update_where<P, M>(&self, predicate: P, mutation: M) -> IsolationResult<usize>
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
        M: Fn(&mut R) + Send + Sync + 'static,
    {
        let context = self.context()?;
        self.require_escalation(&context, "update_where")?;
        let query = self.scoped(&context).with_filter(Predicate::new(predicate));
        let pinned = Mutation::new(move |record: &mut R| {
            let owner = record.tenant_id().cloned();
            mutation(record);
            if let Some(owner) = owner {
                if record.tenant_id() != Some(&owner) {
                    record.assign_tenant(owner);
                }
            }
        });

        let started = Instant::now();
        let updated = self.run(self.store.update_where(&query, &pinned)).await?;
        self.observe(&context, QueryKind::BulkUpdate, started, updated);
        Ok(updated)
    }

    /// Deletes every visible record matching `predicate`.
    #[instrument(skip_all, fields(entity_type = R::ENTITY_TYPE))]
    pub async fn delete_where<P>(&self, predicate: P) -> IsolationResult<usize>
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let context = self.context()?;
        self.require_escalation(&context, "delete_where")?;
        let query = self.scoped(&context).with_filter(Predicate::new(predicate));

        let started = Instant::now();
        let deleted = self.run(self.store.delete_where(&query)).await?;
        self.observe(&context, QueryKind::BulkDelete, started, deleted);
        Ok(deleted)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn context(&self) -> IsolationResult<TenantContext> {
        Ok(self.holder.current()?)
    }

    fn scoped(&self, context: &TenantContext) -> ScopedQuery<R> {
        ScopedQuery::new(TenantScope::for_context(context))
    }

    async fn fetch(
        &self,
        kind: QueryKind,
        build: impl FnOnce(ScopedQuery<R>) -> ScopedQuery<R>,
    ) -> IsolationResult<Vec<R>> {
        let context = self.context()?;
        let query = build(self.scoped(&context));

        let started = Instant::now();
        let records = self.run(self.store.fetch(&query)).await?;
        self.observe(&context, kind, started, records.len());
        Ok(records)
    }

    async fn run<T>(&self, op: impl Future<Output = StoreResult<T>>) -> IsolationResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IsolationError::Cancelled),
            result = op => Ok(result?),
        }
    }

    fn observe(&self, context: &TenantContext, kind: QueryKind, started: Instant, rows: usize) {
        self.observer.query_performance(QuerySample {
            entity_type: R::ENTITY_TYPE,
            query_kind: kind,
            elapsed: started.elapsed(),
            rows_returned: rows,
            tenant_id: context.tenant_id(),
        });
    }

    fn require_escalation(&self, context: &TenantContext, operation: &str) -> IsolationResult<()> {
        if !context.is_system() || self.holder.is_escalated() {
            return Ok(());
        }
        error!(
            entity_type = R::ENTITY_TYPE,
            operation,
            source = context.source(),
            "System-mode write without cross-tenant escalation"
        );
        self.observer.isolation_violation(
            None,
            ViolationKind::UnauthorizedEscalation,
            R::ENTITY_TYPE,
            format!("{operation} attempted in system context ({})", context.source()),
        );
        Err(IsolationError::UnauthorizedEscalation {
            entity_type: R::ENTITY_TYPE.to_string(),
            operation: operation.to_string(),
        })
    }

    fn check_owner(&self, context: &TenantContext, existing: &R) -> IsolationResult<()> {
        let Some(tenant_id) = context.tenant_id() else {
            return Ok(());
        };
        if existing.tenant_id() == Some(tenant_id) {
            return Ok(());
        }
        let violation = IsolationViolation::tenant_mismatch(
            ViolationKind::ForeignRecordMutation,
            tenant_id,
            existing.tenant_id(),
            R::ENTITY_TYPE,
            Some(existing.record_id()),
        );
        Err(self.violation(context, violation))
    }

    fn violation(&self, context: &TenantContext, violation: IsolationViolation) -> IsolationError {
        error!(
            kind = %violation.kind,
            entity_type = %violation.entity_type,
            entity_id = violation.entity_id.as_deref().unwrap_or_default(),
            expected_tenant = violation.expected_tenant.as_ref().map(|t| t.as_str()).unwrap_or_default(),
            actual_tenant = violation.actual_tenant.as_ref().map(|t| t.as_str()).unwrap_or_default(),
            source = context.source(),
            "Tenant isolation violation"
        );
        self.observer.isolation_violation(
            context.tenant_id(),
            violation.kind,
            &violation.entity_type,
            violation.message.clone(),
        );
        IsolationError::Violation(violation)
    }
}

fn not_found<R: TenantScoped>(id: &str) -> IsolationError {
    IsolationError::NotFound {
        entity_type: R::ENTITY_TYPE.to_string(),
        id: id.to_string(),
    }
}
