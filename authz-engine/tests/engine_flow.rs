//! End-to-end engine scenarios: creation, dual-control decisions,
//! settlement outcomes, idempotency, and limit enforcement.

use authz_engine::{
    Actor, AuditAction, AuditBackend, AuditEvent, Config, CreatePaymentRequest, Error,
    PaymentEngine, ReasonCode,
};
use chrono::Utc;
use ledger_store::{
    Account, AccountId, Currency, Limit, PaymentStatus, Role, Storage,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Audit backend that forwards events to the test
struct CaptureBackend(mpsc::UnboundedSender<AuditEvent>);

impl AuditBackend for CaptureBackend {
    fn record(&mut self, event: AuditEvent) {
        let _ = self.0.send(event);
    }
}

struct Harness {
    engine: Arc<PaymentEngine>,
    audit_rx: mpsc::UnboundedReceiver<AuditEvent>,
    _temp: TempDir,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.data_dir = temp.path().to_path_buf();

        let store = Arc::new(Storage::open(&config.store).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = PaymentEngine::with_backend(config, store, CaptureBackend(tx)).unwrap();

        Self {
            engine: Arc::new(engine),
            audit_rx: rx,
            _temp: temp,
        }
    }

    fn seed_account(&self, id: &str, balance: Decimal) {
        self.seed_account_with(id, balance, true);
    }

    fn seed_account_with(&self, id: &str, balance: Decimal, active: bool) {
        self.engine
            .store()
            .put_account(&Account {
                id: AccountId::new(id),
                holder: format!("Holder {}", id),
                currency: Currency::TRY,
                balance,
                active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    fn seed_limit(&self, single: Decimal, daily: Decimal) {
        self.engine
            .store()
            .put_limit(&Limit {
                role: Role::Maker,
                currency: Currency::TRY,
                max_single_amount: single,
                max_daily_amount: daily,
                active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    fn balance(&self, id: &str) -> Decimal {
        self.engine
            .store()
            .get_account(&AccountId::new(id))
            .unwrap()
            .balance
    }

    async fn next_audit(&mut self) -> AuditEvent {
        tokio::time::timeout(Duration::from_secs(5), self.audit_rx.recv())
            .await
            .expect("audit event not delivered")
            .expect("audit channel closed")
    }
}

fn request(key: &str, source: &str, target: &str, amount: Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        idempotency_key: key.to_string(),
        source: AccountId::new(source),
        target: AccountId::new(target),
        amount,
        currency: None,
        description: None,
    }
}

fn maker() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Maker)
}

fn checker() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Checker)
}

#[tokio::test]
async fn test_full_approval_flow_settles_in_one_round_trip() {
    let mut h = Harness::new();
    h.seed_account("TR100001", dec!(10000.00));
    h.seed_account("TR100002", dec!(0.00));

    let view = h
        .engine
        .create(
            request("flow-1", "TR100001", "TR100002", dec!(5000.00)),
            maker(),
            Some("corr-1"),
        )
        .await
        .unwrap();
    assert_eq!(view.status, PaymentStatus::Pending);

    // Approve returns the terminal settled state, not APPROVED
    let settled = h
        .engine
        .approve(view.id, checker(), Some("corr-1"))
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(settled.approved_by.is_some());

    assert_eq!(h.balance("TR100001"), dec!(5000.00));
    assert_eq!(h.balance("TR100002"), dec!(5000.00));

    // Audit trail in lifecycle order with correlation id intact
    let actions: Vec<AuditAction> = vec![
        h.next_audit().await,
        h.next_audit().await,
        h.next_audit().await,
        h.next_audit().await,
    ]
    .into_iter()
    .inspect(|e| assert_eq!(e.correlation_id.as_deref(), Some("corr-1")))
    .map(|e| e.action)
    .collect();

    assert_eq!(
        actions,
        vec![
            AuditAction::PaymentCreated,
            AuditAction::PaymentApproved,
            AuditAction::PaymentProcessing,
            AuditAction::PaymentCompleted,
        ]
    );

    assert_eq!(h.engine.metrics().settlements_completed.get(), 1);
}

#[tokio::test]
async fn test_insufficient_balance_fails_settlement_leaves_balances() {
    let mut h = Harness::new();
    h.seed_account("TR100001", dec!(50.00));
    h.seed_account("TR100002", dec!(0.00));

    let view = h
        .engine
        .create(
            request("poor-1", "TR100001", "TR100002", dec!(100.00)),
            maker(),
            None,
        )
        .await
        .unwrap();

    let settled = h.engine.approve(view.id, checker(), None).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Failed);

    assert_eq!(h.balance("TR100001"), dec!(50.00));
    assert_eq!(h.balance("TR100002"), dec!(0.00));

    // created, approved, processing, then failed with the reason
    for _ in 0..3 {
        h.next_audit().await;
    }
    let failed = h.next_audit().await;
    assert_eq!(failed.action, AuditAction::PaymentFailed);
    assert_eq!(
        failed.details.unwrap()["reason"],
        serde_json::json!("Insufficient balance")
    );

    assert_eq!(h.engine.metrics().settlements_failed.get(), 1);

    // FAILED is terminal
    let err = h
        .engine
        .approve(settled.id, checker(), None)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::InvalidTransition));
}

#[tokio::test]
async fn test_reject_stores_reason_verbatim() {
    let mut h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(0.00));

    let view = h
        .engine
        .create(
            request("rej-1", "TR100001", "TR100002", dec!(100.00)),
            maker(),
            None,
        )
        .await
        .unwrap();

    let rejected = h
        .engine
        .reject(view.id, checker(), "Suspicious".to_string(), None)
        .await
        .unwrap();
    assert_eq!(rejected.status, PaymentStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Suspicious"));

    // No balance movement
    assert_eq!(h.balance("TR100001"), dec!(1000.00));
    assert_eq!(h.balance("TR100002"), dec!(0.00));

    h.next_audit().await; // created
    let audit = h.next_audit().await;
    assert_eq!(audit.action, AuditAction::PaymentRejected);
    assert_eq!(
        audit.details.unwrap()["reason"],
        serde_json::json!("Suspicious")
    );

    // No further transitions from REJECTED
    let err = h
        .engine
        .approve(view.id, checker(), None)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::InvalidTransition));
    let err = h
        .engine
        .reject(view.id, checker(), "again".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::InvalidTransition));
}

#[tokio::test]
async fn test_sequential_idempotent_create() {
    let mut h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(0.00));

    let m = maker();
    let first = h
        .engine
        .create(request("dup-1", "TR100001", "TR100002", dec!(100.00)), m, None)
        .await
        .unwrap();

    // Retried with a different amount: original returned unchanged
    let second = h
        .engine
        .create(request("dup-1", "TR100001", "TR100002", dec!(999.00)), m, None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, dec!(100.00));
    assert_eq!(h.engine.metrics().payments_created.get(), 1);

    // Exactly one PAYMENT_CREATED audit event
    let audit = h.next_audit().await;
    assert_eq!(audit.action, AuditAction::PaymentCreated);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), h.audit_rx.recv())
            .await
            .is_err(),
        "replay must not emit a second audit event"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_idempotent_create_single_row() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(0.00));
    let m = maker();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create(
                    request("race-1", "TR100001", "TR100002", dec!(100.00)),
                    m,
                    None,
                )
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "all submissions converge to one payment");
    assert_eq!(h.engine.metrics().payments_created.get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opposite_transfers_conserve_balances() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(1000.00));

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = h.engine.clone();
        let (source, target) = if i % 2 == 0 {
            ("TR100001", "TR100002")
        } else {
            ("TR100002", "TR100001")
        };
        let key = format!("xfer-{}", i);

        handles.push(tokio::spawn(async move {
            let view = engine
                .create(request(&key, source, target, dec!(100.00)), maker(), None)
                .await
                .unwrap();
            engine.approve(view.id, checker(), None).await.unwrap()
        }));
    }

    let mut completed = 0u32;
    for handle in handles {
        let view = handle.await.unwrap();
        assert!(matches!(
            view.status,
            PaymentStatus::Completed | PaymentStatus::Failed
        ));
        if view.status == PaymentStatus::Completed {
            completed += 1;
        }
    }

    let a = h.balance("TR100001");
    let b = h.balance("TR100002");

    // Exact conservation, no negative balances, all settlements terminal
    assert_eq!(a + b, dec!(2000.00));
    assert!(a >= Decimal::ZERO);
    assert!(b >= Decimal::ZERO);
    assert_eq!(
        h.engine.metrics().settlements_completed.get(),
        completed as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvals_settle_exactly_once() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(10000.00));
    h.seed_account("TR100002", dec!(0.00));

    let rounds = 20u32;
    for i in 0..rounds {
        let view = h
            .engine
            .create(
                request(&format!("race-appr-{}", i), "TR100001", "TR100002", dec!(100.00)),
                maker(),
                None,
            )
            .await
            .unwrap();

        let first = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.approve(view.id, checker(), None).await })
        };
        let second = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.approve(view.id, checker(), None).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one approval may settle");

        let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
        assert_eq!(loser.reason_code(), Some(ReasonCode::InvalidTransition));

        assert_eq!(
            h.engine.get(view.id).unwrap().status,
            PaymentStatus::Completed
        );
    }

    // One debit per payment, never two
    assert_eq!(
        h.balance("TR100001"),
        dec!(10000.00) - dec!(100.00) * Decimal::from(rounds)
    );
    assert_eq!(h.balance("TR100002"), dec!(100.00) * Decimal::from(rounds));
    assert_eq!(h.engine.metrics().settlements_completed.get(), rounds as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approve_and_reject_single_outcome() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(0.00));

    for i in 0..20 {
        let view = h
            .engine
            .create(
                request(&format!("race-dec-{}", i), "TR100001", "TR100002", dec!(10.00)),
                maker(),
                None,
            )
            .await
            .unwrap();

        let approve = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.approve(view.id, checker(), None).await })
        };
        let reject = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .reject(view.id, checker(), "duplicate review".to_string(), None)
                    .await
            })
        };

        let approve_res = approve.await.unwrap();
        let reject_res = reject.await.unwrap();
        assert_ne!(
            approve_res.is_ok(),
            reject_res.is_ok(),
            "exactly one decision may land"
        );

        // Whichever decision lost, the stored state is terminal and
        // consistent with the winner
        let stored = h.engine.get(view.id).unwrap();
        if approve_res.is_ok() {
            assert_eq!(stored.status, PaymentStatus::Completed);
            assert!(stored.rejection_reason.is_none());
        } else {
            assert_eq!(stored.status, PaymentStatus::Rejected);
            assert_eq!(stored.rejection_reason.as_deref(), Some("duplicate review"));
        }
    }

    let a = h.balance("TR100001");
    let b = h.balance("TR100002");
    assert_eq!(a + b, dec!(1000.00));
    assert_eq!(
        b,
        dec!(10.00) * Decimal::from(h.engine.metrics().settlements_completed.get())
    );
}

#[tokio::test]
async fn test_single_transaction_limit() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(10000.00));
    h.seed_account("TR100002", dec!(0.00));
    h.seed_limit(dec!(100.00), dec!(500.00));

    let err = h
        .engine
        .create(
            request("lim-1", "TR100001", "TR100002", dec!(150.00)),
            maker(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::LimitExceededSingle));

    // Nothing was persisted
    assert!(h
        .engine
        .store()
        .find_by_idempotency_key("lim-1")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_daily_limit_counts_pending_spend() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(10000.00));
    h.seed_account("TR100002", dec!(0.00));
    h.seed_limit(dec!(250.00), dec!(500.00));

    let m = maker();
    for i in 0..2 {
        h.engine
            .create(
                request(
                    &format!("day-{}", i),
                    "TR100001",
                    "TR100002",
                    dec!(200.00),
                ),
                m,
                None,
            )
            .await
            .unwrap();
    }

    // 400 already pending; a third 200 breaks the 500 cap
    let err = h
        .engine
        .create(
            request("day-2", "TR100001", "TR100002", dec!(200.00)),
            m,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::LimitExceededDaily));

    // A different maker with no prior spend is unaffected
    h.engine
        .create(
            request("day-other", "TR100001", "TR100002", dec!(200.00)),
            maker(),
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_payments_do_not_count_toward_daily_cap() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(10000.00));
    h.seed_account("TR100002", dec!(0.00));
    h.seed_limit(dec!(250.00), dec!(500.00));

    let m = maker();
    let first = h
        .engine
        .create(
            request("cap-0", "TR100001", "TR100002", dec!(200.00)),
            m,
            None,
        )
        .await
        .unwrap();
    h.engine
        .reject(first.id, checker(), "mistake".to_string(), None)
        .await
        .unwrap();

    // Rejected 200 freed the cap: two more 200s fit under 500
    for i in 1..3 {
        h.engine
            .create(
                request(&format!("cap-{}", i), "TR100001", "TR100002", dec!(200.00)),
                m,
                None,
            )
            .await
            .unwrap();
    }

    let err = h
        .engine
        .create(
            request("cap-3", "TR100001", "TR100002", dec!(200.00)),
            m,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some(ReasonCode::LimitExceededDaily));
}

#[tokio::test]
async fn test_currency_defaulting_and_explicit_codes() {
    let h = Harness::new();
    h.seed_account("TR100001", dec!(1000.00));
    h.seed_account("TR100002", dec!(0.00));

    let defaulted = h
        .engine
        .create(
            request("cur-1", "TR100001", "TR100002", dec!(10.00)),
            maker(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(defaulted.currency, Currency::TRY);

    let mut req = request("cur-2", "TR100001", "TR100002", dec!(10.00));
    req.currency = Some("usd".to_string());
    let explicit = h.engine.create(req, maker(), None).await.unwrap();
    assert_eq!(explicit.currency, Currency::USD);
}

#[tokio::test]
async fn test_not_found_carries_entity_and_key() {
    let h = Harness::new();

    let missing = Uuid::new_v4();
    let err = h.engine.approve(missing, checker(), None).await.unwrap_err();
    match err {
        Error::NotFound { entity, key } => {
            assert_eq!(entity, "Payment");
            assert_eq!(key, missing.to_string());
        }
        other => panic!("expected NotFound, got {}", other),
    }
}
