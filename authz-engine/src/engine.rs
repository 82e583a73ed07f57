//! Payment authorization engine
//!
//! Orchestrates creation, approval, and rejection of payments under the
//! dual-control policy: idempotency check, account resolution, limit
//! policy, state transition, audit emission, and (on approval) the
//! synchronous settlement routine.

use crate::{
    audit::{spawn_audit_sink, AuditAction, AuditBackend, AuditHandle, TracingBackend},
    limits::LimitPolicy,
    metrics::Metrics,
    settlement::SettlementRoutine,
    Config, Error, ReasonCode, Result,
};
use chrono::{DateTime, Utc};
use ledger_store::{
    AccountId, AccountLocks, Currency, Payment, PaymentStatus, Role, Storage,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Longest accepted idempotency key
const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

/// An authenticated actor, resolved upstream of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Actor identity
    pub id: Uuid,
    /// Actor role
    pub role: Role,
}

impl Actor {
    /// Create new actor
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Payment creation request
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    /// Caller-supplied idempotency key (unique, <= 64 chars)
    pub idempotency_key: String,

    /// Source account
    pub source: AccountId,

    /// Target account
    pub target: AccountId,

    /// Amount (positive; normalized to 2 decimal places)
    pub amount: Decimal,

    /// Currency code; engine default when absent or blank
    pub currency: Option<String>,

    /// Optional free-text description
    pub description: Option<String>,
}

/// Caller-facing view of a payment
#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    /// Payment ID
    pub id: Uuid,
    /// Idempotency key
    pub idempotency_key: String,
    /// Source account
    pub source: AccountId,
    /// Target account
    pub target: AccountId,
    /// Amount
    pub amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Description
    pub description: Option<String>,
    /// Status
    pub status: PaymentStatus,
    /// Maker identity
    pub created_by: Uuid,
    /// Checker identity
    pub approved_by: Option<Uuid>,
    /// Rejection reason
    pub rejection_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.payment_id,
            idempotency_key: p.idempotency_key,
            source: p.source,
            target: p.target,
            amount: p.amount,
            currency: p.currency,
            description: p.description,
            status: p.status,
            created_by: p.created_by,
            approved_by: p.approved_by,
            rejection_reason: p.rejection_reason,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Payment authorization engine
pub struct PaymentEngine {
    store: Arc<Storage>,
    limits: LimitPolicy,
    settlement: SettlementRoutine,
    audit: AuditHandle,
    metrics: Metrics,
    config: Config,
}

impl PaymentEngine {
    /// Create new engine, opening the store from configuration.
    ///
    /// Audit events go to the default tracing backend. Must be called
    /// within a tokio runtime (the audit drain task is spawned here).
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Storage::open(&config.store)?);
        Self::with_backend(config, store, TracingBackend)
    }

    /// Create new engine over an existing store and audit backend
    pub fn with_backend(
        config: Config,
        store: Arc<Storage>,
        backend: impl AuditBackend,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let audit = spawn_audit_sink(
            backend,
            config.audit_queue_capacity,
            metrics.audit_dropped.clone(),
        );
        let locks = Arc::new(AccountLocks::new());

        let limits = LimitPolicy::new(store.clone());
        let settlement =
            SettlementRoutine::new(store.clone(), locks, audit.clone(), metrics.clone());

        Ok(Self {
            store,
            limits,
            settlement,
            audit,
            metrics,
            config,
        })
    }

    /// Shared store handle (account and limit administration live
    /// outside the engine)
    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Create a payment in PENDING.
    ///
    /// Idempotent: resubmitting an existing key returns the original
    /// payment unchanged, with no new side effects and no new audit
    /// event. All validation fires before any state mutation.
    pub async fn create(
        &self,
        request: CreatePaymentRequest,
        actor: Actor,
        correlation_id: Option<&str>,
    ) -> Result<PaymentView> {
        if request.idempotency_key.is_empty()
            || request.idempotency_key.len() > MAX_IDEMPOTENCY_KEY_LEN
        {
            return Err(Error::rule(
                ReasonCode::InvalidIdempotencyKey,
                format!(
                    "Idempotency key must be 1..={} characters",
                    MAX_IDEMPOTENCY_KEY_LEN
                ),
            ));
        }

        if let Some(existing) = self.store.find_by_idempotency_key(&request.idempotency_key)? {
            tracing::info!(
                idempotency_key = %request.idempotency_key,
                "Idempotent request detected"
            );
            return Ok(existing.into());
        }

        if request.source == request.target {
            return Err(Error::rule(
                ReasonCode::SameAccount,
                "Source and target accounts cannot be the same",
            ));
        }

        let source = self.store.get_account(&request.source)?;
        let target = self.store.get_account(&request.target)?;

        if !source.active {
            return Err(Error::rule(
                ReasonCode::AccountInactive,
                "Source account is inactive",
            ));
        }
        if !target.active {
            return Err(Error::rule(
                ReasonCode::AccountInactive,
                "Target account is inactive",
            ));
        }

        if request.amount <= Decimal::ZERO {
            return Err(Error::rule(
                ReasonCode::InvalidAmount,
                format!("Amount must be positive, got {}", request.amount),
            ));
        }
        let amount = request.amount.round_dp(2);

        let currency = match request.currency.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                Currency::parse(code).ok_or_else(|| {
                    Error::rule(
                        ReasonCode::InvalidCurrency,
                        format!("Unknown currency: {}", code),
                    )
                })?
            }
            _ => self.config.default_currency,
        };

        let now = Utc::now();
        self.limits
            .check(actor.role, currency, amount, &actor.id, now)?;

        let payment = Payment {
            payment_id: Uuid::now_v7(),
            idempotency_key: request.idempotency_key,
            source: source.id,
            target: target.id,
            amount,
            currency,
            description: request.description,
            status: PaymentStatus::Pending,
            created_by: actor.id,
            approved_by: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        // The unique idempotency index is the source of truth; a
        // concurrent duplicate collapses here into the existing row
        let (payment, created) = self.store.insert_payment_idempotent(&payment)?;
        if !created {
            return Ok(payment.into());
        }

        tracing::info!(
            payment_id = %payment.payment_id,
            maker = %actor.id,
            "Payment created"
        );

        self.audit.emit(
            payment.payment_id,
            AuditAction::PaymentCreated,
            actor.id,
            correlation_id,
            Some(json!({
                "amount": payment.amount.to_string(),
                "source": payment.source.as_str(),
                "target": payment.target.as_str(),
            })),
        );
        self.metrics.payments_created.inc();

        Ok(payment.into())
    }

    /// Approve a PENDING payment and settle it synchronously.
    ///
    /// The returned view carries the terminal settled state (COMPLETED
    /// or FAILED), not the intermediate APPROVED state.
    pub async fn approve(
        &self,
        payment_id: Uuid,
        checker: Actor,
        correlation_id: Option<&str>,
    ) -> Result<PaymentView> {
        let mut payment = self.store.get_payment(payment_id)?;

        // Maker-checker: maker cannot approve their own payment
        if payment.created_by == checker.id {
            return Err(Error::rule(
                ReasonCode::SelfApproval,
                "Maker cannot approve their own payment",
            ));
        }

        if !payment.status.can_transition_to(PaymentStatus::Approved) {
            return Err(Error::rule(
                ReasonCode::InvalidTransition,
                format!("Cannot transition from {} to APPROVED", payment.status),
            ));
        }

        payment.transition_to(PaymentStatus::Approved, Utc::now());
        payment.approved_by = Some(checker.id);

        // Conditional write: a concurrent decision on the same payment
        // has already moved it past PENDING, and this approval must not
        // trigger a second settlement
        if !self
            .store
            .update_payment_if_status(PaymentStatus::Pending, &payment)?
        {
            return Err(Error::rule(
                ReasonCode::InvalidTransition,
                "Payment is no longer PENDING",
            ));
        }

        tracing::info!(
            payment_id = %payment.payment_id,
            checker = %checker.id,
            "Payment approved"
        );

        self.audit.emit(
            payment.payment_id,
            AuditAction::PaymentApproved,
            checker.id,
            correlation_id,
            None,
        );
        self.metrics.payments_approved.inc();

        let settled = self.settlement.settle(payment, correlation_id).await?;
        Ok(settled.into())
    }

    /// Reject a PENDING payment with a reason. No settlement occurs.
    pub async fn reject(
        &self,
        payment_id: Uuid,
        checker: Actor,
        reason: String,
        correlation_id: Option<&str>,
    ) -> Result<PaymentView> {
        let mut payment = self.store.get_payment(payment_id)?;

        if payment.created_by == checker.id {
            return Err(Error::rule(
                ReasonCode::SelfRejection,
                "Maker cannot reject their own payment",
            ));
        }

        if !payment.status.can_transition_to(PaymentStatus::Rejected) {
            return Err(Error::rule(
                ReasonCode::InvalidTransition,
                format!("Cannot transition from {} to REJECTED", payment.status),
            ));
        }

        payment.transition_to(PaymentStatus::Rejected, Utc::now());
        payment.approved_by = Some(checker.id);
        payment.rejection_reason = Some(reason.clone());

        // Conditional write: an already-approved (or settled) payment
        // must not be overwritten by a stale rejection
        if !self
            .store
            .update_payment_if_status(PaymentStatus::Pending, &payment)?
        {
            return Err(Error::rule(
                ReasonCode::InvalidTransition,
                "Payment is no longer PENDING",
            ));
        }

        tracing::info!(
            payment_id = %payment.payment_id,
            checker = %checker.id,
            "Payment rejected"
        );

        self.audit.emit(
            payment.payment_id,
            AuditAction::PaymentRejected,
            checker.id,
            correlation_id,
            Some(json!({ "reason": reason })),
        );
        self.metrics.payments_rejected.inc();

        Ok(payment.into())
    }

    /// Fetch a payment by ID
    pub fn get(&self, payment_id: Uuid) -> Result<PaymentView> {
        Ok(self.store.get_payment(payment_id)?.into())
    }
}
