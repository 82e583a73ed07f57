//! Payment Authorization Engine
//!
//! Dual-control ("maker-checker") payment authorization and settlement:
//! one actor proposes a payment, a different actor approves or rejects
//! it, and only on approval are funds moved.
//!
//! # Architecture
//!
//! 1. **Creation**: idempotency guard, account resolution, per-role
//!    spending limits, persist PENDING
//! 2. **Decision**: a checker distinct from the maker approves or
//!    rejects; every status change walks the transition graph
//! 3. **Settlement**: ordered account locks, balance re-read, atomic
//!    debit/credit commit; failure becomes a terminal FAILED payment,
//!    never an error
//! 4. **Audit**: fire-and-forget structured events over a bounded
//!    channel
//!
//! # Example
//!
//! ```no_run
//! use authz_engine::{Actor, Config, CreatePaymentRequest, PaymentEngine};
//! use ledger_store::{AccountId, Role};
//! use rust_decimal::Decimal;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> authz_engine::Result<()> {
//!     let engine = PaymentEngine::new(Config::default())?;
//!
//!     let maker = Actor::new(Uuid::new_v4(), Role::Maker);
//!     let view = engine
//!         .create(
//!             CreatePaymentRequest {
//!                 idempotency_key: "req-1".into(),
//!                 source: AccountId::new("TR100001"),
//!                 target: AccountId::new("TR100002"),
//!                 amount: Decimal::new(500000, 2),
//!                 currency: None,
//!                 description: None,
//!             },
//!             maker,
//!             None,
//!         )
//!         .await?;
//!     println!("payment {} is {}", view.id, view.status);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod limits;
pub mod metrics;
pub mod settlement;

// Re-exports
pub use audit::{AuditAction, AuditBackend, AuditEvent, AuditHandle, TracingBackend};
pub use config::Config;
pub use engine::{Actor, CreatePaymentRequest, PaymentEngine, PaymentView};
pub use error::{Error, ReasonCode, Result};
pub use limits::LimitPolicy;
pub use metrics::Metrics;
