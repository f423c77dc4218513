//! Audited cross-tenant escalation.
//!
//! System-mode writes are only allowed while an escalation installed here is
//! active. Each escalation captures the holder's prior state, installs a
//! system context tagged with the caller's justification, and restores the
//! prior state on every exit path: success, error, cancellation, a dropped
//! future, or a panic unwinding through the frame.
//!
//! Escalations nest. Each frame restores exactly what it captured, so an
//! inner frame returning leaves the outer escalation in place.

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ContextNotSetError, EscalationError};
use crate::observe::{CrossTenantSample, Observer, OperationOutcome};
use crate::tenant::{ContextHolder, EscalationRecord, Slot, TenantContext, TenantId};

/// Prefix of the source tag carried by escalated system contexts.
pub const CROSS_TENANT_SOURCE_PREFIX: &str = "Cross-tenant: ";

/// Runs operations with a temporarily elevated system context.
#[derive(Debug, Clone)]
pub struct CrossTenantManager {
    holder: Arc<ContextHolder>,
    observer: Observer,
}

impl CrossTenantManager {
    /// Creates a manager for the request owning `holder`.
    pub fn new(holder: Arc<ContextHolder>, observer: Observer) -> Self {
        Self { holder, observer }
    }

    /// Returns the context holder.
    pub fn holder(&self) -> &Arc<ContextHolder> {
        &self.holder
    }

    /// Runs `op` under an audited system context.
    ///
    /// The prior context is restored before this returns, whatever `op`
    /// does. If `cancel` fires first, `op` is dropped and
    /// [`EscalationError::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// - [`EscalationError::MissingJustification`] for a blank justification.
    /// - [`EscalationError::ContextNotSet`] if there is no prior context.
    /// - [`EscalationError::Cancelled`] on cancellation.
    /// - Whatever `op` returns.
    pub async fn execute_cross_tenant<F, Fut, T, E>(
        &self,
        justification: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<EscalationError>,
    {
        let frame = self.escalate(justification, OperationOutcome::Cancelled)?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = op() => Some(result),
        };

        match result {
            Some(Ok(value)) => {
                frame.finish(OperationOutcome::Completed);
                Ok(value)
            }
            Some(Err(err)) => {
                frame.finish(OperationOutcome::Failed);
                Err(err)
            }
            None => {
                frame.finish(OperationOutcome::Cancelled);
                Err(EscalationError::Cancelled.into())
            }
        }
    }

    /// Escalates until the returned scope is released or dropped.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`execute_cross_tenant`](Self::execute_cross_tenant).
    pub fn begin_cross_tenant(&self, justification: &str) -> Result<CrossTenantScope, EscalationError> {
        let frame = self.escalate(justification, OperationOutcome::Released)?;
        Ok(CrossTenantScope { frame })
    }

    fn escalate(
        &self,
        justification: &str,
        drop_outcome: OperationOutcome,
    ) -> Result<EscalationFrame, EscalationError> {
        if justification.trim().is_empty() {
            return Err(EscalationError::MissingJustification);
        }

        let previous = self.holder.snapshot();
        let prior = previous.context().cloned().ok_or(ContextNotSetError)?;

        let record = EscalationRecord {
            id: Uuid::new_v4(),
            justification: justification.to_string(),
        };
        let mut system = TenantContext::system(format!("{CROSS_TENANT_SOURCE_PREFIX}{justification}"));
        if let Some(correlation_id) = prior.correlation_id() {
            system = system.with_correlation_id(correlation_id);
        }
        if let Some(user_id) = prior.user_id() {
            system = system.with_user_id(user_id);
        }
        self.holder.escalate(system, record.clone());

        info!(
            escalation_id = %record.id,
            justification,
            prior_source = prior.source(),
            prior_tenant = prior.tenant_id().map(TenantId::as_str).unwrap_or("<system>"),
            "Cross-tenant escalation started"
        );

        Ok(EscalationFrame {
            holder: Arc::clone(&self.holder),
            observer: self.observer.clone(),
            previous: Some(previous),
            record,
            initiated_by: describe_initiator(&prior),
            prior_tenant: prior.tenant_id().cloned(),
            started: Instant::now(),
            drop_outcome,
        })
    }
}

/// An escalation that lasts until [`release`](Self::release) or drop.
///
/// Intended for callers that cannot express their work as one future.
#[must_use = "the escalation ends when the scope is dropped"]
#[derive(Debug)]
pub struct CrossTenantScope {
    frame: EscalationFrame,
}

impl CrossTenantScope {
    /// Returns the escalation id reported in audit events.
    pub fn escalation_id(&self) -> Uuid {
        self.frame.record.id
    }

    /// Returns `true` until the scope has been released.
    pub fn is_active(&self) -> bool {
        self.frame.previous.is_some()
    }

    /// Restores the prior context. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        self.frame.release(OperationOutcome::Released);
    }
}

#[derive(Debug)]
struct EscalationFrame {
    holder: Arc<ContextHolder>,
    observer: Observer,
    previous: Option<Slot>,
    record: EscalationRecord,
    initiated_by: String,
    prior_tenant: Option<TenantId>,
    started: Instant,
    drop_outcome: OperationOutcome,
}

impl EscalationFrame {
    fn finish(mut self, outcome: OperationOutcome) {
        self.release(outcome);
    }

    fn release(&mut self, outcome: OperationOutcome) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        if !self.holder.restore(previous, self.record.id) {
            warn!(
                escalation_id = %self.record.id,
                "Cross-tenant escalation released out of order; restored a stale context"
            );
        }

        let elapsed = self.started.elapsed();
        match outcome {
            OperationOutcome::Completed | OperationOutcome::Released => info!(
                escalation_id = %self.record.id,
                elapsed_ms = elapsed.as_millis() as u64,
                outcome = ?outcome,
                "Cross-tenant escalation ended"
            ),
            OperationOutcome::Failed | OperationOutcome::Cancelled => warn!(
                escalation_id = %self.record.id,
                elapsed_ms = elapsed.as_millis() as u64,
                outcome = ?outcome,
                "Cross-tenant escalation ended"
            ),
        }

        self.observer.cross_tenant_operation(CrossTenantSample {
            escalation_id: self.record.id,
            operation_name: self.record.justification.clone(),
            justification: self.record.justification.clone(),
            elapsed,
            initiated_by: self.initiated_by.clone(),
            prior_tenant: self.prior_tenant.clone(),
            outcome,
        });
    }
}

impl Drop for EscalationFrame {
    fn drop(&mut self) {
        let outcome = if thread::panicking() {
            OperationOutcome::Failed
        } else {
            self.drop_outcome
        };
        self.release(outcome);
    }
}

fn describe_initiator(prior: &TenantContext) -> String {
    match prior.user_id() {
        Some(user) => format!("{} (user {})", prior.source(), user),
        None => prior.source().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{AuditEventKind, MemorySink};

    fn setup() -> (CrossTenantManager, Arc<ContextHolder>, Arc<MemorySink>) {
        let holder = Arc::new(ContextHolder::with_context(
            TenantContext::for_tenant(TenantId::new("a"), "header:X-Tenant-ID")
                .unwrap()
                .with_user_id("alice"),
        ));
        let sink = Arc::new(MemorySink::new());
        let manager = CrossTenantManager::new(holder.clone(), Observer::with_sink(sink.clone()));
        (manager, holder, sink)
    }

    #[tokio::test]
    async fn test_escalates_and_restores() {
        let (manager, holder, sink) = setup();
        let before = holder.current().unwrap();

        let inner = holder.clone();
        let seen = manager
            .execute_cross_tenant("nightly report", &CancellationToken::new(), || async move {
                Ok::<_, EscalationError>((inner.current().unwrap(), inner.is_escalated()))
            })
            .await
            .unwrap();

        assert!(seen.0.is_system());
        assert_eq!(seen.0.source(), "Cross-tenant: nightly report");
        assert!(seen.1);
        assert_eq!(holder.current().unwrap(), before);
        assert!(!holder.is_escalated());

        let events = sink.cross_tenant();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            AuditEventKind::CrossTenantOperation {
                justification,
                initiated_by,
                outcome,
                ..
            } => {
                assert_eq!(justification, "nightly report");
                assert_eq!(initiated_by, "header:X-Tenant-ID (user alice)");
                assert_eq!(*outcome, OperationOutcome::Completed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_justification_rejected() {
        let (manager, holder, _) = setup();
        let err = manager
            .execute_cross_tenant("   ", &CancellationToken::new(), || async {
                Ok::<(), EscalationError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, EscalationError::MissingJustification);
        assert!(!holder.is_escalated());
    }

    #[tokio::test]
    async fn test_unset_holder_rejected() {
        let manager = CrossTenantManager::new(Arc::new(ContextHolder::new()), Observer::default());
        let err = manager.begin_cross_tenant("backfill").unwrap_err();
        assert_eq!(err, EscalationError::ContextNotSet(ContextNotSetError));
    }

    #[tokio::test]
    async fn test_scope_release_is_idempotent() {
        let (manager, holder, sink) = setup();
        let mut scope = manager.begin_cross_tenant("migration").unwrap();
        assert!(holder.is_escalated());
        assert!(scope.is_active());

        scope.release();
        scope.release();
        assert!(!scope.is_active());
        assert!(!holder.is_escalated());
        drop(scope);
        assert_eq!(sink.cross_tenant().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_release_restores_captured_state() {
        let (manager, holder, sink) = setup();
        let mut outer = manager.begin_cross_tenant("outer").unwrap();
        let mut inner = manager.begin_cross_tenant("inner").unwrap();

        outer.release();
        assert_eq!(holder.current().unwrap().tenant_id(), Some(&TenantId::new("a")));

        inner.release();
        assert!(holder.is_escalated());
        assert_eq!(
            holder.escalation().map(|r| r.id),
            Some(outer.escalation_id())
        );
        assert_eq!(sink.cross_tenant().len(), 2);
    }

    #[tokio::test]
    async fn test_scope_drop_restores() {
        let (manager, holder, _) = setup();
        {
            let _scope = manager.begin_cross_tenant("migration").unwrap();
            assert!(holder.current().unwrap().is_system());
        }
        assert_eq!(holder.current().unwrap().tenant_id(), Some(&TenantId::new("a")));
    }
}
