//! End-to-end demo: seed two accounts and a maker limit, create a
//! payment, approve it with a distinct checker, print the outcome.

use authz_engine::{Actor, Config, CreatePaymentRequest, PaymentEngine};
use chrono::Utc;
use ledger_store::{Account, AccountId, Currency, Limit, Role};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    let engine = PaymentEngine::new(config)?;

    let now = Utc::now();
    for (id, balance) in [("TR330001000001", 10_000_00i64), ("TR330001000002", 0)] {
        engine.store().put_account(&Account {
            id: AccountId::new(id),
            holder: format!("Demo holder {}", id),
            currency: Currency::TRY,
            balance: Decimal::new(balance, 2),
            active: true,
            created_at: now,
            updated_at: now,
        })?;
    }

    engine.store().put_limit(&Limit {
        role: Role::Maker,
        currency: Currency::TRY,
        max_single_amount: Decimal::new(7_500_00, 2),
        max_daily_amount: Decimal::new(25_000_00, 2),
        active: true,
        created_at: now,
        updated_at: now,
    })?;

    let maker = Actor::new(Uuid::new_v4(), Role::Maker);
    let checker = Actor::new(Uuid::new_v4(), Role::Checker);

    let pending = engine
        .create(
            CreatePaymentRequest {
                idempotency_key: format!("demo-{}", Uuid::new_v4()),
                source: AccountId::new("TR330001000001"),
                target: AccountId::new("TR330001000002"),
                amount: Decimal::new(5_000_00, 2),
                currency: Some("TRY".to_string()),
                description: Some("Demo transfer".to_string()),
            },
            maker,
            Some("demo-corr-1"),
        )
        .await?;
    println!("created: {} [{}]", pending.id, pending.status);

    let settled = engine.approve(pending.id, checker, Some("demo-corr-1")).await?;
    println!("settled: {} [{}]", settled.id, settled.status);

    let source = engine.store().get_account(&AccountId::new("TR330001000001"))?;
    let target = engine.store().get_account(&AccountId::new("TR330001000002"))?;
    println!("balances: source={} target={}", source.balance, target.balance);

    Ok(())
}
