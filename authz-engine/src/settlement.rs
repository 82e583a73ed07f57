//! Settlement routine
//!
//! Performs the balance transfer for an approved payment. Invoked only
//! by the engine, synchronously after a PENDING→APPROVED transition.
//!
//! Settlement failure is a terminal business outcome, never an error:
//! by the time this routine runs the payment is already authorized, so
//! every path records a definitive final status (COMPLETED or FAILED)
//! rather than leaving the payment ambiguous or surfacing an exception
//! to the approve caller.

use crate::{
    audit::{AuditAction, AuditHandle},
    metrics::Metrics,
    Result,
};
use chrono::Utc;
use ledger_store::{AccountLocks, Payment, PaymentStatus, Storage};
use serde_json::json;
use std::sync::Arc;

/// Settlement routine over the shared store and lock registry
pub struct SettlementRoutine {
    store: Arc<Storage>,
    locks: Arc<AccountLocks>,
    audit: AuditHandle,
    metrics: Metrics,
}

impl SettlementRoutine {
    /// Create new settlement routine
    pub(crate) fn new(
        store: Arc<Storage>,
        locks: Arc<AccountLocks>,
        audit: AuditHandle,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            locks,
            audit,
            metrics,
        }
    }

    /// Settle an APPROVED payment and return it in its terminal state.
    pub(crate) async fn settle(
        &self,
        mut payment: Payment,
        correlation_id: Option<&str>,
    ) -> Result<Payment> {
        let actor = payment.approved_by.unwrap_or(payment.created_by);

        // APPROVED -> PROCESSING is persisted before any lock is taken
        payment.transition_to(PaymentStatus::Processing, Utc::now());
        self.store.update_payment(&payment)?;
        self.audit.emit(
            payment.payment_id,
            AuditAction::PaymentProcessing,
            actor,
            correlation_id,
            None,
        );

        match self.transfer(&mut payment, correlation_id).await {
            Ok(()) => Ok(payment),
            Err(err) => {
                // Unexpected failure (storage error, poisoned row): force
                // the payment to FAILED and return normally. A direct
                // status write, not a graph walk: the payment must end
                // FAILED no matter where the transfer stopped
                tracing::error!(
                    payment_id = %payment.payment_id,
                    error = %err,
                    "Settlement failed"
                );

                payment.status = PaymentStatus::Failed;
                payment.updated_at = Utc::now();
                if let Err(persist_err) = self.store.update_payment(&payment) {
                    tracing::error!(
                        payment_id = %payment.payment_id,
                        error = %persist_err,
                        "Could not persist FAILED status"
                    );
                }

                self.audit.emit(
                    payment.payment_id,
                    AuditAction::PaymentFailed,
                    actor,
                    correlation_id,
                    Some(json!({ "reason": err.to_string() })),
                );
                self.metrics.settlements_failed.inc();

                Ok(payment)
            }
        }
    }

    /// Locked balance transfer: re-read, check, mutate, commit.
    async fn transfer(&self, payment: &mut Payment, correlation_id: Option<&str>) -> Result<()> {
        let actor = payment.approved_by.unwrap_or(payment.created_by);

        // Locks are acquired in canonical ascending-identifier order and
        // released on guard drop, even on failure
        let _guard = self.locks.lock_pair(&payment.source, &payment.target).await;

        // Re-read balances under lock
        let mut source = self.store.get_account(&payment.source)?;
        let mut target = self.store.get_account(&payment.target)?;

        if source.balance < payment.amount {
            payment.transition_to(PaymentStatus::Failed, Utc::now());
            self.store.update_payment(payment)?;

            tracing::warn!(
                payment_id = %payment.payment_id,
                balance = %source.balance,
                amount = %payment.amount,
                "Insufficient balance"
            );

            self.audit.emit(
                payment.payment_id,
                AuditAction::PaymentFailed,
                actor,
                correlation_id,
                Some(json!({ "reason": "Insufficient balance" })),
            );
            self.metrics.settlements_failed.inc();

            return Ok(());
        }

        let now = Utc::now();
        source.balance -= payment.amount;
        source.updated_at = now;
        target.balance += payment.amount;
        target.updated_at = now;

        // Commit a settled copy; the caller's payment only becomes
        // COMPLETED once the batch is durable, so a commit error leaves
        // it in PROCESSING for the failure path to finalize
        let mut settled = payment.clone();
        settled.transition_to(PaymentStatus::Completed, now);

        // Both account rows and the payment land in one atomic commit
        self.store.commit_settlement(&settled, &source, &target)?;
        *payment = settled;

        tracing::info!(payment_id = %payment.payment_id, "Payment completed");

        self.audit.emit(
            payment.payment_id,
            AuditAction::PaymentCompleted,
            actor,
            correlation_id,
            Some(json!({
                "sourceBalance": source.balance.to_string(),
                "targetBalance": target.balance.to_string(),
            })),
        );
        self.metrics.settlements_completed.inc();

        Ok(())
    }
}
