//! Error types for the credit ledger.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by ledger operations.
///
/// Every variant is recoverable by the caller; none of them should take the
/// process down.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The wallet address failed format or checksum validation.
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    /// The on-chain hash or idempotency key has already been consumed.
    #[error("duplicate transaction: {key}")]
    DuplicateTransaction {
        /// The hash or idempotency key that was reused.
        key: String,
    },

    /// The balance does not cover the requested debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// No API key was presented.
    #[error("missing API key")]
    MissingKey,

    /// The API key is unknown, revoked, or belongs to a disabled user.
    #[error("invalid API key")]
    InvalidKey,

    /// The action has no entry in the cost table.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The credit package id is not in the catalog.
    #[error("unknown credit package: {0}")]
    UnknownPackage(String),

    /// The user does not exist.
    #[error("user not found: {user_id}")]
    UserNotFound {
        /// The user that was looked up.
        user_id: String,
    },

    /// The API key id does not exist for this user.
    #[error("API key not found: {key_id}")]
    KeyNotFound {
        /// The key id that was looked up.
        key_id: String,
    },

    /// A credit or money amount is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A non-amount argument failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The store could not complete the operation (transient).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Whether a caller may retry the same request later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
