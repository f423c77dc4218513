//! Observation hooks.
//!
//! Every guarded query, isolation violation and cross-tenant escalation is
//! reported as an [`AuditEvent`] to an [`ObservationSink`]. Reporting is
//! fire-and-continue: a failing or panicking sink is logged at `error` level
//! and never affects the operation being observed.
//!
//! Each emission also updates `metrics` series:
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `palisade_query_duration_ms` | histogram | `entity_type`, `query_kind` |
//! | `palisade_slow_queries_total` | counter | `entity_type`, `query_kind` |
//! | `palisade_isolation_violations_total` | counter | `entity_type`, `violation_kind` |
//! | `palisade_cross_tenant_operations_total` | counter | `outcome` |
//! | `palisade_observation_sink_failures_total` | counter | |

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{SinkError, ViolationKind};
use crate::tenant::TenantId;

/// Configuration for the observation hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Queries slower than this are flagged as slow.
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
}

fn default_slow_query_threshold_ms() -> u64 {
    500
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
        }
    }
}

/// How loudly an event should be treated by downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine telemetry.
    Info,
    /// Worth a look (slow queries).
    Warning,
    /// Isolation violations. Always the highest level.
    Critical,
}

/// The kind of guarded read or bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum QueryKind {
    GetById,
    GetAll,
    Find,
    Count,
    Any,
    Query,
    BulkUpdate,
    BulkDelete,
}

impl QueryKind {
    /// Returns the snake_case name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::GetById => "get_by_id",
            QueryKind::GetAll => "get_all",
            QueryKind::Find => "find",
            QueryKind::Count => "count",
            QueryKind::Any => "any",
            QueryKind::Query => "query",
            QueryKind::BulkUpdate => "bulk_update",
            QueryKind::BulkDelete => "bulk_delete",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an escalated operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationOutcome {
    /// The operation returned `Ok`.
    Completed,
    /// The operation returned an error or panicked.
    Failed,
    /// The cancellation token fired or the future was dropped.
    Cancelled,
    /// A scoped handle was released (or dropped).
    Released,
}

impl OperationOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            OperationOutcome::Completed => "completed",
            OperationOutcome::Failed => "failed",
            OperationOutcome::Cancelled => "cancelled",
            OperationOutcome::Released => "released",
        }
    }
}

/// Event-specific payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEventKind {
    QueryPerformance {
        query_kind: QueryKind,
        elapsed_ms: u64,
        rows_returned: usize,
        tenant_filter_applied: bool,
        slow: bool,
    },
    IsolationViolation {
        violation_kind: ViolationKind,
    },
    CrossTenantOperation {
        escalation_id: Uuid,
        operation_name: String,
        justification: String,
        elapsed_ms: u64,
        /// Source (and user, when known) of the context that escalated.
        initiated_by: String,
        outcome: OperationOutcome,
    },
}

/// A single observation emitted by the isolation layer. Not stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened.
    #[serde(flatten)]
    pub kind: AuditEventKind,
    /// How loudly to treat it.
    pub severity: Severity,
    /// The tenant active when it happened, `None` for system context.
    pub tenant_id: Option<TenantId>,
    /// The record type involved, if any.
    pub entity_type: Option<String>,
    /// Human-readable summary.
    pub details: String,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Returns `true` for isolation-violation events.
    pub fn is_violation(&self) -> bool {
        matches!(self.kind, AuditEventKind::IsolationViolation { .. })
    }

    /// Returns `true` for cross-tenant operation events.
    pub fn is_cross_tenant(&self) -> bool {
        matches!(self.kind, AuditEventKind::CrossTenantOperation { .. })
    }

    /// Returns `true` for query-performance events.
    pub fn is_query_performance(&self) -> bool {
        matches!(self.kind, AuditEventKind::QueryPerformance { .. })
    }
}

/// Receives audit events.
///
/// Implementations must not block: hand the event to a queue, a channel or
/// a non-blocking writer and return.
pub trait ObservationSink: Send + Sync {
    /// Accepts one event.
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Writes events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        let tenant_id = event.tenant_id.as_ref().map(TenantId::as_str).unwrap_or("<system>");
        let entity_type = event.entity_type.as_deref().unwrap_or("-");
        match event.severity {
            Severity::Critical => error!(
                target: "palisade::audit",
                tenant_id,
                entity_type,
                details = %event.details,
                "audit event"
            ),
            Severity::Warning => warn!(
                target: "palisade::audit",
                tenant_id,
                entity_type,
                details = %event.details,
                "audit event"
            ),
            Severity::Info => info!(
                target: "palisade::audit",
                tenant_id,
                entity_type,
                details = %event.details,
                "audit event"
            ),
        }
        Ok(())
    }
}

/// Forwards events over an unbounded tokio channel for asynchronous
/// consumption.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ObservationSink for ChannelSink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        self.sender.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Returns only violation events.
    pub fn violations(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.is_violation()).cloned().collect()
    }

    /// Returns only cross-tenant events.
    pub fn cross_tenant(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.is_cross_tenant()).cloned().collect()
    }

    /// Returns only query-performance events.
    pub fn queries(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_query_performance())
            .cloned()
            .collect()
    }

    /// Removes all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ObservationSink for MemorySink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservationSink for NoopSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Timing sample for a guarded query.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy)]
pub struct QuerySample<'a> {
    pub entity_type: &'static str,
    pub query_kind: QueryKind,
    pub elapsed: Duration,
    pub rows_returned: usize,
    pub tenant_id: Option<&'a TenantId>,
}

/// Summary of a finished cross-tenant escalation.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct CrossTenantSample {
    pub escalation_id: Uuid,
    pub operation_name: String,
    pub justification: String,
    pub elapsed: Duration,
    pub initiated_by: String,
    pub prior_tenant: Option<TenantId>,
    pub outcome: OperationOutcome,
}

/// Emits audit events to a sink.
///
/// Cheap to clone; guards and managers each hold one.
#[derive(Clone)]
pub struct Observer {
    sink: Arc<dyn ObservationSink>,
    config: ObservationConfig,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink), ObservationConfig::default())
    }
}

impl Observer {
    /// Creates an observer writing to `sink`.
    pub fn new(sink: Arc<dyn ObservationSink>, config: ObservationConfig) -> Self {
        Self { sink, config }
    }

    /// Creates an observer with default configuration.
    pub fn with_sink(sink: Arc<dyn ObservationSink>) -> Self {
        Self::new(sink, ObservationConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Reports a guarded query. Queries over the threshold are flagged slow.
    pub fn query_performance(&self, sample: QuerySample<'_>) {
        let elapsed_ms = duration_ms(sample.elapsed);
        let slow = elapsed_ms > self.config.slow_query_threshold_ms;
        let tenant_filter_applied = sample.tenant_id.is_some();

        metrics::histogram!(
            "palisade_query_duration_ms",
            "entity_type" => sample.entity_type,
            "query_kind" => sample.query_kind.as_str()
        )
        .record(sample.elapsed.as_secs_f64() * 1000.0);

        if slow {
            metrics::counter!(
                "palisade_slow_queries_total",
                "entity_type" => sample.entity_type,
                "query_kind" => sample.query_kind.as_str()
            )
            .increment(1);
            warn!(
                entity_type = sample.entity_type,
                query_kind = %sample.query_kind,
                elapsed_ms,
                threshold_ms = self.config.slow_query_threshold_ms,
                "Slow tenant-scoped query"
            );
        }

        self.dispatch(AuditEvent {
            kind: AuditEventKind::QueryPerformance {
                query_kind: sample.query_kind,
                elapsed_ms,
                rows_returned: sample.rows_returned,
                tenant_filter_applied,
                slow,
            },
            severity: if slow { Severity::Warning } else { Severity::Info },
            tenant_id: sample.tenant_id.cloned(),
            entity_type: Some(sample.entity_type.to_string()),
            details: format!(
                "{} returned {} row(s) in {}ms",
                sample.query_kind, sample.rows_returned, elapsed_ms
            ),
            timestamp: Utc::now(),
        });
    }

    /// Reports an isolation violation at critical severity.
    pub fn isolation_violation(
        &self,
        tenant_id: Option<&TenantId>,
        violation_kind: ViolationKind,
        entity_type: &str,
        details: impl Into<String>,
    ) {
        metrics::counter!(
            "palisade_isolation_violations_total",
            "entity_type" => entity_type.to_string(),
            "violation_kind" => violation_kind.to_string()
        )
        .increment(1);

        self.dispatch(AuditEvent {
            kind: AuditEventKind::IsolationViolation { violation_kind },
            severity: Severity::Critical,
            tenant_id: tenant_id.cloned(),
            entity_type: Some(entity_type.to_string()),
            details: details.into(),
            timestamp: Utc::now(),
        });
    }

    /// Reports the end of a cross-tenant escalation.
    pub fn cross_tenant_operation(&self, sample: CrossTenantSample) {
        let elapsed_ms = duration_ms(sample.elapsed);
        metrics::counter!(
            "palisade_cross_tenant_operations_total",
            "outcome" => sample.outcome.as_str()
        )
        .increment(1);

        let details = format!(
            "{} by {} ({}) in {}ms",
            sample.operation_name,
            sample.initiated_by,
            sample.outcome.as_str(),
            elapsed_ms
        );
        self.dispatch(AuditEvent {
            kind: AuditEventKind::CrossTenantOperation {
                escalation_id: sample.escalation_id,
                operation_name: sample.operation_name,
                justification: sample.justification,
                elapsed_ms,
                initiated_by: sample.initiated_by,
                outcome: sample.outcome,
            },
            severity: Severity::Info,
            tenant_id: sample.prior_tenant,
            entity_type: None,
            details,
            timestamp: Utc::now(),
        });
    }

    fn dispatch(&self, event: AuditEvent) {
        match catch_unwind(AssertUnwindSafe(|| self.sink.record(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::counter!("palisade_observation_sink_failures_total").increment(1);
                error!(error = %e, details = %event.details, "Observation sink failed to record event");
            }
            Err(_) => {
                metrics::counter!("palisade_observation_sink_failures_total").increment(1);
                error!(details = %event.details, "Observation sink panicked while recording event");
            }
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
