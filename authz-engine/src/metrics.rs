//! Metrics collection for observability
//!
//! Prometheus counters for the payment lifecycle, registered against
//! an engine-local registry so multiple engines (tests) can coexist.
//!
//! # Metrics
//!
//! - `payments_created_total` - Payments persisted in PENDING
//! - `payments_approved_total` - Checker approvals
//! - `payments_rejected_total` - Checker rejections
//! - `settlements_completed_total` - Settlements ending COMPLETED
//! - `settlements_failed_total` - Settlements ending FAILED
//! - `audit_events_dropped_total` - Audit events lost to queue overflow

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Payments persisted in PENDING
    pub payments_created: IntCounter,

    /// Checker approvals
    pub payments_approved: IntCounter,

    /// Checker rejections
    pub payments_rejected: IntCounter,

    /// Settlements ending COMPLETED
    pub settlements_completed: IntCounter,

    /// Settlements ending FAILED
    pub settlements_failed: IntCounter,

    /// Audit events lost to queue overflow
    pub audit_dropped: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let payments_created = IntCounter::with_opts(Opts::new(
            "payments_created_total",
            "Payments persisted in PENDING",
        ))?;
        registry.register(Box::new(payments_created.clone()))?;

        let payments_approved =
            IntCounter::with_opts(Opts::new("payments_approved_total", "Checker approvals"))?;
        registry.register(Box::new(payments_approved.clone()))?;

        let payments_rejected =
            IntCounter::with_opts(Opts::new("payments_rejected_total", "Checker rejections"))?;
        registry.register(Box::new(payments_rejected.clone()))?;

        let settlements_completed = IntCounter::with_opts(Opts::new(
            "settlements_completed_total",
            "Settlements ending COMPLETED",
        ))?;
        registry.register(Box::new(settlements_completed.clone()))?;

        let settlements_failed = IntCounter::with_opts(Opts::new(
            "settlements_failed_total",
            "Settlements ending FAILED",
        ))?;
        registry.register(Box::new(settlements_failed.clone()))?;

        let audit_dropped = IntCounter::with_opts(Opts::new(
            "audit_events_dropped_total",
            "Audit events lost to queue overflow",
        ))?;
        registry.register(Box::new(audit_dropped.clone()))?;

        Ok(Self {
            payments_created,
            payments_approved,
            payments_rejected,
            settlements_completed,
            settlements_failed,
            audit_dropped,
            registry,
        })
    }
}
