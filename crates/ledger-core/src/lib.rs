//! Core types for the credit ledger.
//!
//! This crate provides the domain types shared by the store, the service and
//! the client:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `ApiKeyId`
//! - **Users**: `User`, keyed by a validated `WalletAddress`
//! - **Credits**: `CreditTransaction`, `TransactionType`, `TransactionStatus`
//! - **API keys**: `ApiKey` (stored form, no secret)
//! - **Pricing**: `PackageCatalog`, `CommissionRate`, `ActionCosts`
//! - **Reports**: `UsagePeriod`, `DailyUsage`, `KeyUsage`, `LedgerStats`
//!
//! # Units
//!
//! Credits are whole `i64` units. Money is `i64` cents. Commission rates are
//! integer basis points, so no ledger arithmetic touches floating point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod address;
pub mod api_key;
pub mod credits;
pub mod error;
pub mod ids;
pub mod pricing;
pub mod report;
pub mod user;

pub use address::WalletAddress;
pub use api_key::{mask_token, ApiKey, API_KEY_PREFIX, MAX_KEY_NAME_LEN};
pub use credits::{
    CreditTransaction, PurchaseDetails, TransactionStatus, TransactionType, UnknownVariant,
};
pub use error::{LedgerError, Result};
pub use ids::{ApiKeyId, IdError, TransactionId, UserId};
pub use pricing::{
    ActionCosts, CommissionRate, CreditPackage, PackageCatalog, BPS_DENOMINATOR,
    DEFAULT_COMMISSION_BPS,
};
pub use report::{
    daily_series, DailyUsage, KeyUsage, LedgerEntry, LedgerStats, UsagePeriod, UserSummary,
};
pub use user::User;
