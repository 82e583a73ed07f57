//! Fire-and-forget audit sink
//!
//! Audit persistence and querying live outside this engine; all the
//! engine needs is a non-blocking `emit` contract. Events flow through
//! a bounded mpsc channel into a spawned drain task that hands them to
//! a pluggable backend. `emit` never blocks and never fails the owning
//! operation: a full queue drops the event, counts the drop, and logs
//! a warning.

use chrono::{DateTime, Utc};
use prometheus::IntCounter;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Audit action describing a payment state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Payment created in PENDING
    PaymentCreated,
    /// Payment approved by checker
    PaymentApproved,
    /// Payment rejected by checker
    PaymentRejected,
    /// Settlement started
    PaymentProcessing,
    /// Settlement complete
    PaymentCompleted,
    /// Settlement failed
    PaymentFailed,
}

impl AuditAction {
    /// Stable action code
    pub fn code(&self) -> &'static str {
        match self {
            AuditAction::PaymentCreated => "PAYMENT_CREATED",
            AuditAction::PaymentApproved => "PAYMENT_APPROVED",
            AuditAction::PaymentRejected => "PAYMENT_REJECTED",
            AuditAction::PaymentProcessing => "PAYMENT_PROCESSING",
            AuditAction::PaymentCompleted => "PAYMENT_COMPLETED",
            AuditAction::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

/// Structured audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Entity type ("PAYMENT")
    pub entity_type: &'static str,

    /// Entity identifier
    pub entity_id: Uuid,

    /// Action performed
    pub action: AuditAction,

    /// Actor who performed the action
    pub actor_id: Uuid,

    /// Caller-supplied correlation id
    pub correlation_id: Option<String>,

    /// Action-specific JSON payload
    pub details: Option<Value>,

    /// Event timestamp
    pub occurred_at: DateTime<Utc>,
}

/// Destination for drained audit events
///
/// Implementations must absorb their own failures; a backend error
/// never reaches the emitting operation.
pub trait AuditBackend: Send + 'static {
    /// Record one event
    fn record(&mut self, event: AuditEvent);
}

/// Default backend: structured tracing output
pub struct TracingBackend;

impl AuditBackend for TracingBackend {
    fn record(&mut self, event: AuditEvent) {
        tracing::info!(
            entity_type = event.entity_type,
            entity_id = %event.entity_id,
            action = event.action.code(),
            actor_id = %event.actor_id,
            correlation_id = event.correlation_id.as_deref().unwrap_or("-"),
            details = %event.details.as_ref().map(serde_json::Value::to_string).unwrap_or_default(),
            "audit"
        );
    }
}

/// Handle for emitting audit events
#[derive(Clone)]
pub struct AuditHandle {
    sender: mpsc::Sender<AuditEvent>,
    dropped: IntCounter,
}

impl AuditHandle {
    /// Emit an event, fire-and-forget.
    ///
    /// Never blocks; a full or closed queue is logged and counted, not
    /// surfaced, so an audit delivery failure can never roll back a
    /// committed payment decision.
    pub fn emit(
        &self,
        entity_id: Uuid,
        action: AuditAction,
        actor_id: Uuid,
        correlation_id: Option<&str>,
        details: Option<Value>,
    ) {
        let event = AuditEvent {
            entity_type: "PAYMENT",
            entity_id,
            action,
            actor_id,
            correlation_id: correlation_id.map(str::to_string),
            details,
            occurred_at: Utc::now(),
        };

        if let Err(err) = self.sender.try_send(event) {
            self.dropped.inc();
            tracing::warn!(
                entity_id = %entity_id,
                action = action.code(),
                "Audit event dropped: {}",
                err
            );
        }
    }
}

/// Spawn the audit drain task and return an emit handle
pub fn spawn_audit_sink(
    mut backend: impl AuditBackend,
    capacity: usize,
    dropped: IntCounter,
) -> AuditHandle {
    let (tx, mut rx) = mpsc::channel(capacity);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            backend.record(event);
        }
    });

    AuditHandle {
        sender: tx,
        dropped,
    }
}
