//! Tests for audited cross-tenant escalation.
//!
//! The holder must equal its prior value after every escalation, whatever
//! way the escalated operation ends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{Fixture, invoice, tenant_context};
use palisade_isolation::observe::{AuditEventKind, OperationOutcome};
use palisade_isolation::prelude::*;

fn outcomes(fx: &Fixture) -> Vec<OperationOutcome> {
    fx.sink
        .cross_tenant()
        .into_iter()
        .filter_map(|e| match e.kind {
            AuditEventKind::CrossTenantOperation { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Restoration Tests
// ============================================================================

#[tokio::test]
async fn test_restores_after_success() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let holder = fx.holder.clone();

    let source = fx
        .manager
        .execute_cross_tenant("monthly billing", &CancellationToken::new(), || async move {
            Ok::<_, EscalationError>(holder.current()?.source().to_string())
        })
        .await
        .unwrap();

    assert_eq!(source, "Cross-tenant: monthly billing");
    assert_eq!(fx.holder.current().unwrap(), before);
    assert!(!fx.holder.is_escalated());
    assert_eq!(outcomes(&fx), vec![OperationOutcome::Completed]);
}

#[tokio::test]
async fn test_restores_after_error() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let guard = fx.guard.clone();

    let err = fx
        .manager
        .execute_cross_tenant("cleanup", &CancellationToken::new(), || async move {
            guard.require_by_id("inv-404").await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, IsolationError::NotFound { .. }));
    assert_eq!(fx.holder.current().unwrap(), before);
    assert_eq!(outcomes(&fx), vec![OperationOutcome::Failed]);
}

#[tokio::test]
async fn test_restores_after_cancellation() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let err = fx
        .manager
        .execute_cross_tenant("long export", &token, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), EscalationError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(err, EscalationError::Cancelled);
    assert_eq!(fx.holder.current().unwrap(), before);
    assert!(!fx.holder.is_escalated());
    assert_eq!(outcomes(&fx), vec![OperationOutcome::Cancelled]);
}

#[tokio::test]
async fn test_restores_when_future_dropped() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let holder = fx.holder.clone();

    let result = tokio::time::timeout(
        Duration::from_millis(10),
        fx.manager
            .execute_cross_tenant("stuck job", &CancellationToken::new(), || async {
                std::future::pending::<Result<(), EscalationError>>().await
            }),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(holder.current().unwrap(), before);
    assert_eq!(outcomes(&fx), vec![OperationOutcome::Cancelled]);
}

#[tokio::test]
async fn test_restores_after_panic() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let manager = fx.manager.clone();

    let handle = tokio::spawn(async move {
        manager
            .execute_cross_tenant("faulty", &CancellationToken::new(), || async {
                if fail_now() {
                    panic!("operation blew up");
                }
                Ok::<(), EscalationError>(())
            })
            .await
    });

    assert!(handle.await.unwrap_err().is_panic());
    assert_eq!(fx.holder.current().unwrap(), before);
    assert!(!fx.holder.is_escalated());
    assert_eq!(outcomes(&fx).len(), 1);
}

fn fail_now() -> bool {
    true
}

// ============================================================================
// Nesting Tests
// ============================================================================

#[tokio::test]
async fn test_nested_escalations_restore_their_own_frame() {
    let fx = Fixture::new(tenant_context("acme"));
    let before = fx.holder.current().unwrap();
    let manager = fx.manager.clone();
    let holder = fx.holder.clone();

    fx.manager
        .execute_cross_tenant("outer", &CancellationToken::new(), || async move {
            manager
                .execute_cross_tenant("inner", &CancellationToken::new(), || async {
                    assert_eq!(holder.current()?.source(), "Cross-tenant: inner");
                    Ok::<(), EscalationError>(())
                })
                .await?;

            // Inner frame restored the outer escalation, not the tenant
            assert_eq!(holder.current()?.source(), "Cross-tenant: outer");
            assert!(holder.is_escalated());
            Ok::<(), EscalationError>(())
        })
        .await
        .unwrap();

    assert_eq!(fx.holder.current().unwrap(), before);
    assert_eq!(
        outcomes(&fx),
        vec![OperationOutcome::Completed, OperationOutcome::Completed]
    );
}

// ============================================================================
// Scope Handle Tests
// ============================================================================

#[tokio::test]
async fn test_scope_allows_system_writes_until_released() {
    let fx = Fixture::new(tenant_context("acme"));

    let mut scope = fx.manager.begin_cross_tenant("data repair").unwrap();
    fx.guard.create(invoice("inv-9", "globex", 5)).await.unwrap();
    scope.release();

    // After release the acme context is back and writes are checked again
    let err = fx.guard.create(invoice("inv-10", "globex", 5)).await.unwrap_err();
    assert!(err.is_violation());
    assert_eq!(fx.store.len(), 4);
}

#[tokio::test]
async fn test_escalation_requires_justification_and_context() {
    let fx = Fixture::new(tenant_context("acme"));
    assert_eq!(
        fx.manager.begin_cross_tenant("").unwrap_err(),
        EscalationError::MissingJustification
    );

    let unset = CrossTenantManager::new(Arc::new(ContextHolder::new()), Observer::default());
    let err = unset
        .execute_cross_tenant("report", &CancellationToken::new(), || async {
            Ok::<(), EscalationError>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EscalationError::ContextNotSet(_)));
}
