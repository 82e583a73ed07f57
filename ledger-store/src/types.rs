//! Core domain types for the payment ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (IBAN, account number, etc.)
///
/// Ordered so that settlement can acquire account locks in a canonical
/// ascending order across all invocations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Turkish Lira (system default)
    TRY,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::TRY => "TRY",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TRY" => Some(Currency::TRY),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::TRY
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Actor role under the dual-control policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Administers accounts and limits
    Admin,
    /// Proposes payments
    Maker,
    /// Approves or rejects payments
    Checker,
}

impl Role {
    /// Stable role code
    pub fn code(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Maker => "MAKER",
            Role::Checker => "CHECKER",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "MAKER" => Some(Role::Maker),
            "CHECKER" => Some(Role::Checker),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Payment lifecycle status
///
/// The transition graph is the single source of truth for legal status
/// changes; every mutation site checks it before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    /// Awaiting checker decision
    Pending = 1,
    /// Approved by checker, not yet settled
    Approved = 2,
    /// Rejected by checker (terminal)
    Rejected = 3,
    /// Settlement in progress
    Processing = 4,
    /// Settlement complete (terminal)
    Completed = 5,
    /// Settlement failed (terminal)
    Failed = 6,
}

impl PaymentStatus {
    /// Pure transition check: no side effects, evaluated before any
    /// state mutation is persisted.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Check if no further transition is permitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Rejected | PaymentStatus::Completed | PaymentStatus::Failed
        )
    }

    /// Stable status code
    pub fn code(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A payment under dual control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique payment ID (UUIDv7 for time-ordering)
    pub payment_id: Uuid,

    /// Caller-supplied idempotency key (unique, <= 64 chars)
    pub idempotency_key: String,

    /// Source (debtor) account; immutable after creation
    pub source: AccountId,

    /// Target (creditor) account; immutable after creation
    pub target: AccountId,

    /// Payment amount (positive, scaled to 2 decimal places)
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Optional free-text description
    pub description: Option<String>,

    /// Current status
    pub status: PaymentStatus,

    /// Maker identity
    pub created_by: Uuid,

    /// Checker identity (null until approved/rejected)
    pub approved_by: Option<Uuid>,

    /// Rejection reason (null unless rejected)
    pub rejection_reason: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Advance the payment status along the transition graph.
    ///
    /// Returns `false` and leaves the payment untouched when the
    /// requested transition is illegal.
    pub fn transition_to(&mut self, target: PaymentStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(target) {
            return false;
        }
        self.status = target;
        self.updated_at = now;
        true
    }
}

/// A ledger account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,

    /// Account holder name
    pub holder: String,

    /// Account currency
    pub currency: Currency,

    /// Signed decimal balance; never goes negative as a result of
    /// settlement
    pub balance: Decimal,

    /// Active flag; inactive accounts cannot participate in payments
    pub active: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Spending limit for a (role, currency) pair
///
/// At most one active limit exists per pair; the store keys limits by
/// the pair itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limit {
    /// Role the limit applies to
    pub role: Role,

    /// Currency the limit applies to
    pub currency: Currency,

    /// Maximum single-transaction amount
    pub max_single_amount: Decimal,

    /// Maximum aggregate amount per calendar day
    pub max_daily_amount: Decimal,

    /// Active flag
    pub active: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("TRY"), Some(Currency::TRY));
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("XXX"), None);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("maker"), Some(Role::Maker));
        assert_eq!(Role::parse("CHECKER"), Some(Role::Checker));
        assert_eq!(Role::parse("AUDITOR"), None);
    }

    #[test]
    fn test_legal_transitions() {
        use PaymentStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        use PaymentStatus::*;

        // No transition is ever reversed
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Approved));

        // Terminal states never leave
        for terminal in [Rejected, Completed, Failed] {
            for target in [Pending, Approved, Rejected, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }

        // Settlement states are not reachable from PENDING directly
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(PaymentStatus::Rejected.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Approved.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }

    #[test]
    fn test_payment_transition_updates_timestamp() {
        let now = Utc::now();
        let mut payment = Payment {
            payment_id: Uuid::now_v7(),
            idempotency_key: "key-1".to_string(),
            source: AccountId::new("TR100001"),
            target: AccountId::new("TR100002"),
            amount: dec!(100.00),
            currency: Currency::TRY,
            description: None,
            status: PaymentStatus::Pending,
            created_by: Uuid::new_v4(),
            approved_by: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        let later = now + chrono::Duration::seconds(5);
        assert!(payment.transition_to(PaymentStatus::Approved, later));
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert_eq!(payment.updated_at, later);

        // Illegal request leaves the payment untouched
        assert!(!payment.transition_to(PaymentStatus::Completed, later));
        assert_eq!(payment.status, PaymentStatus::Approved);
    }

    #[test]
    fn test_account_id_ordering() {
        let a = AccountId::new("TR100001");
        let b = AccountId::new("TR100002");
        assert!(a < b);
    }
}
