//! Ledger Store
//!
//! Durable storage for accounts, payments, and spending limits, backed
//! by RocksDB.
//!
//! # Architecture
//!
//! - **Atomic commits**: multi-row writes (settlement, payment insert)
//!   go through a single `WriteBatch`
//! - **Idempotent inserts**: the idempotency-key index is the source of
//!   truth for duplicate payment creation
//! - **Ordered locking**: per-account locks are acquired in ascending
//!   identifier order, making settlement deadlock structurally
//!   impossible

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod locks;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use locks::AccountLocks;
pub use storage::Storage;
pub use types::{
    Account, AccountId, Currency, Limit, Payment, PaymentStatus, Role,
};
