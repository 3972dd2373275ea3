//! Credit transaction types.
//!
//! Every balance change writes exactly one `CreditTransaction` row in the
//! same atomic unit as the balance update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ApiKeyId, TransactionId, UserId};

/// A ledger row recording one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Signed credit delta. Positive = credit, negative = debit.
    pub credits: i64,

    /// Money paid in cents (purchases only, otherwise 0).
    pub amount_cents: i64,

    /// Credits withheld as commission (purchases only, otherwise 0).
    pub commission: i64,

    /// On-chain payment hash. Unique across all rows when present.
    pub transaction_hash: Option<String>,

    /// Caller-supplied idempotency key for usage billing. Unique when present.
    pub idempotency_key: Option<String>,

    /// API key a usage debit was billed through.
    pub api_key_id: Option<ApiKeyId>,

    /// Chain the payment was made on (purchases only).
    pub chain_id: Option<i64>,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// Human-readable description.
    pub description: Option<String>,

    /// Balance after this transaction was applied.
    pub balance_after: i64,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    fn base(user_id: UserId, transaction_type: TransactionType, credits: i64) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type,
            credits,
            amount_cents: 0,
            commission: 0,
            transaction_hash: None,
            idempotency_key: None,
            api_key_id: None,
            chain_id: None,
            status: TransactionStatus::Completed,
            description: None,
            balance_after: 0,
            created_at: Utc::now(),
        }
    }

    /// A completed purchase crediting `net_credits`.
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        purchase: &PurchaseDetails,
        net_credits: i64,
        commission: i64,
        balance_after: i64,
    ) -> Self {
        Self {
            amount_cents: purchase.amount_cents,
            commission,
            transaction_hash: Some(purchase.tx_hash.clone()),
            chain_id: purchase.chain_id,
            description: purchase.description.clone(),
            balance_after,
            ..Self::base(user_id, TransactionType::Purchase, net_credits)
        }
    }

    /// A usage debit. The stored delta is always negative.
    #[must_use]
    pub fn usage(
        user_id: UserId,
        credits: i64,
        description: String,
        idempotency_key: Option<String>,
        balance_after: i64,
    ) -> Self {
        Self {
            idempotency_key,
            description: Some(description),
            balance_after,
            ..Self::base(user_id, TransactionType::Usage, -credits.abs())
        }
    }

    /// An administrative correction with a mandatory reason.
    #[must_use]
    pub fn adjustment(user_id: UserId, delta: i64, reason: String, balance_after: i64) -> Self {
        Self {
            description: Some(reason),
            balance_after,
            ..Self::base(user_id, TransactionType::AdminAdjustment, delta)
        }
    }
}

/// Payment facts for a purchase confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseDetails {
    /// On-chain payment transaction hash (the idempotency key).
    pub tx_hash: String,
    /// Gross credits in the purchased package.
    pub package_credits: i64,
    /// Amount paid, in cents.
    pub amount_cents: i64,
    /// Chain the payment was made on.
    pub chain_id: Option<i64>,
    /// Optional description (usually the package name).
    pub description: Option<String>,
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits bought with an on-chain payment.
    Purchase,

    /// Credits deducted for API usage.
    Usage,

    /// Credits returned to the user.
    Refund,

    /// Manual correction by an administrator.
    AdminAdjustment,
}

impl TransactionType {
    /// The stored text form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "usage" => Ok(Self::Usage),
            "refund" => Ok(Self::Refund),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle of a transaction: `pending` moves to `completed` or `failed`,
/// and neither terminal state is left again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Recorded but not yet applied.
    Pending,
    /// Applied to the balance. Immutable.
    Completed,
    /// Abandoned. Its hash still counts as consumed.
    Failed,
}

impl TransactionStatus {
    /// The stored text form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (*self, next),
            (Self::Pending, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum value that this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
