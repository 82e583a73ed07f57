//! Error types for the authorization engine
//!
//! Business rule violations carry a stable machine-readable reason code
//! plus a human message; validation failures always fire before any
//! state mutation. Settlement-stage failures are never surfaced as
//! errors: they become a FAILED payment instead.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable reason codes for business rule violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// Source and target accounts are the same
    SameAccount,
    /// Account is inactive
    AccountInactive,
    /// Maker attempted to approve their own payment
    SelfApproval,
    /// Maker attempted to reject their own payment
    SelfRejection,
    /// Requested status transition is illegal
    InvalidTransition,
    /// Amount exceeds the single-transaction limit
    LimitExceededSingle,
    /// Amount would exceed the daily limit
    LimitExceededDaily,
    /// Unknown currency code
    InvalidCurrency,
    /// Idempotency key missing or too long
    InvalidIdempotencyKey,
    /// Amount is zero or negative
    InvalidAmount,
}

impl ReasonCode {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            ReasonCode::SameAccount => "SAME_ACCOUNT",
            ReasonCode::AccountInactive => "ACCOUNT_INACTIVE",
            ReasonCode::SelfApproval => "SELF_APPROVAL",
            ReasonCode::SelfRejection => "SELF_REJECTION",
            ReasonCode::InvalidTransition => "INVALID_TRANSITION",
            ReasonCode::LimitExceededSingle => "LIMIT_EXCEEDED_SINGLE",
            ReasonCode::LimitExceededDaily => "LIMIT_EXCEEDED_DAILY",
            ReasonCode::InvalidCurrency => "INVALID_CURRENCY",
            ReasonCode::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            ReasonCode::InvalidAmount => "INVALID_AMOUNT",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Authorization engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Entity lookup failed (404-equivalent)
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity type ("Payment", "Account")
        entity: &'static str,
        /// Lookup key
        key: String,
    },

    /// Business rule violation with a stable reason code
    #[error("{code}: {message}")]
    Rule {
        /// Stable reason code
        code: ReasonCode,
        /// Human-readable message
        message: String,
    },

    /// Underlying store error
    #[error("Store error: {0}")]
    Store(ledger_store::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Build a business rule violation
    pub fn rule(code: ReasonCode, message: impl Into<String>) -> Self {
        Error::Rule {
            code,
            message: message.into(),
        }
    }

    /// Reason code, when this is a rule violation
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Error::Rule { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ledger_store::Error> for Error {
    fn from(err: ledger_store::Error) -> Self {
        // Missing rows surface with their entity type intact
        match err {
            ledger_store::Error::AccountNotFound(key) => Error::NotFound {
                entity: "Account",
                key,
            },
            ledger_store::Error::PaymentNotFound(key) => Error::NotFound {
                entity: "Payment",
                key,
            },
            other => Error::Store(other),
        }
    }
}
