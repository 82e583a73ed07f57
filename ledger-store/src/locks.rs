//! Per-account settlement locks
//!
//! Account rows are the only shared mutable resource requiring mutual
//! exclusion. Locks are acquired exclusively through `lock_pair`, which
//! orders acquisition by ascending account identifier so that two
//! concurrent transfers over the same pair of accounts can never
//! deadlock, whichever direction each one runs in.

use crate::types::AccountId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-account async locks
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

/// Guards for both accounts of a settlement; released on drop
pub struct PairGuard {
    _first: OwnedMutexGuard<()>,
    _second: OwnedMutexGuard<()>,
}

impl AccountLocks {
    /// Create new lock registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire exclusive locks on both accounts in canonical order.
    ///
    /// The two identifiers must be distinct; payment creation enforces
    /// source != target before any settlement can run.
    pub async fn lock_pair(&self, a: &AccountId, b: &AccountId) -> PairGuard {
        debug_assert_ne!(a, b, "settlement never locks an account against itself");

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let first = self.lock_for(lo).lock_owned().await;
        let second = self.lock_for(hi).lock_owned().await;

        PairGuard {
            _first: first,
            _second: second,
        }
    }
}
