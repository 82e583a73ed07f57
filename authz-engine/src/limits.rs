//! Per-role spending limit policy
//!
//! Limits are a soft compliance control, not a balance-integrity
//! control: the daily aggregate is read without locking against
//! concurrent creations by the same actor, so two simultaneous
//! creations can both pass the check and jointly exceed the daily cap.
//! That race is accepted and bounded; balance integrity is enforced
//! separately by settlement's strict locking.

use crate::{Error, ReasonCode, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use ledger_store::{Currency, Role, Storage};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Limit policy evaluated once at payment creation
pub struct LimitPolicy {
    store: Arc<Storage>,
}

impl LimitPolicy {
    /// Create new limit policy over the store
    pub fn new(store: Arc<Storage>) -> Self {
        Self { store }
    }

    /// Decide whether a proposed payment may proceed.
    ///
    /// No active limit for the (role, currency) pair means unrestricted.
    /// The daily window starts at local-timezone midnight; every payment
    /// not REJECTED or FAILED counts toward the cap.
    pub fn check(
        &self,
        role: Role,
        currency: Currency,
        amount: Decimal,
        actor_id: &Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<()> {
        let limit = match self.store.find_active_limit(role, currency)? {
            Some(limit) => limit,
            None => {
                tracing::debug!(role = %role, currency = %currency, "No limit defined");
                return Ok(());
            }
        };

        if amount > limit.max_single_amount {
            return Err(Error::rule(
                ReasonCode::LimitExceededSingle,
                format!(
                    "Amount {} exceeds single transaction limit {} for role {}",
                    amount, limit.max_single_amount, role
                ),
            ));
        }

        let since = start_of_local_day(as_of);
        let daily_spent = self.store.sum_spent_since(actor_id, currency, since)?;
        let projected = daily_spent + amount;

        if projected > limit.max_daily_amount {
            return Err(Error::rule(
                ReasonCode::LimitExceededDaily,
                format!(
                    "Projected daily total {} exceeds daily limit {} for role {} (already spent: {})",
                    projected, limit.max_daily_amount, role, daily_spent
                ),
            ));
        }

        tracing::debug!(
            role = %role,
            currency = %currency,
            amount = %amount,
            daily_spent = %daily_spent,
            daily_limit = %limit.max_daily_amount,
            "Limit check passed"
        );

        Ok(())
    }
}

/// Local-timezone midnight of the day containing `as_of`, in UTC.
fn start_of_local_day(as_of: DateTime<Utc>) -> DateTime<Utc> {
    let local_day = as_of.with_timezone(&Local).date_naive();
    match local_day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
    {
        Some(midnight) => midnight.with_timezone(&Utc),
        // Midnight skipped by a DST jump; the day starts at the instant itself
        None => as_of,
    }
}
