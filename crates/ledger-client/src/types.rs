//! Request and response types for the ledger client.

use serde::{Deserialize, Serialize};

use ledger_core::TransactionId;

/// Result of validating the client's API key.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyValidation {
    /// Always true on success.
    pub valid: bool,
    /// Display name of the key.
    pub key_name: String,
    /// Owner's wallet address.
    pub address: String,
    /// Owner's balance in credits.
    pub balance: i64,
}

/// Usage request body.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRequest {
    /// Billable action name.
    pub action: String,
}

/// Receipt for a billed action.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageReceipt {
    /// Ledger row written for the debit.
    pub transaction_id: TransactionId,
    /// Credits debited.
    pub credits_used: i64,
    /// Balance after the debit.
    pub balance: i64,
}

/// One purchasable credit package.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditPackage {
    /// Package id.
    pub id: String,
    /// Gross credits.
    pub credits: i64,
    /// Credits received after commission.
    pub net_credits: i64,
    /// Price in cents.
    pub price_cents: i64,
}

/// The package catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct PackagesResponse {
    /// Available packages.
    pub packages: Vec<CreditPackage>,
    /// Commission in basis points.
    pub commission_bps: u32,
}

/// API error response format.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorDetails,
}

/// API error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
