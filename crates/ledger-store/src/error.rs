//! Error types for ledger storage.

use ledger_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A UNIQUE constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// The atomic unit or pool acquisition ran past its deadline.
    #[error("store operation timed out")]
    Timeout,

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored row could not be mapped back to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Timeout,
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(err.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            // Callers that know which key collided map Conflict themselves;
            // this is the fallback for anything they did not anticipate.
            StoreError::Conflict(what) => Self::DuplicateTransaction { key: what },
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}
