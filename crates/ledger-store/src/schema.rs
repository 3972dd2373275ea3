//! Table rows and their mapping to domain types.
//!
//! Rows are read with `sqlx::FromRow` into plain column structs, then
//! converted into `ledger_core` types. A row that fails conversion means the
//! database holds something this build never wrote.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    ApiKey, ApiKeyId, CreditTransaction, DailyUsage, KeyUsage, LedgerEntry, LedgerStats,
    TransactionId, TransactionStatus, TransactionType, User, UserId, UserSummary, WalletAddress,
};

use crate::error::StoreError;

/// Column list for `users`, in `UserRow` field order.
pub const USER_COLUMNS: &str =
    "id, address, credits, total_spent_cents, is_active, created_at, updated_at, last_login";

/// Column list for `transactions`, in `TransactionRow` field order.
pub const TRANSACTION_COLUMNS: &str = "id, user_id, type, credits, amount_cents, commission, \
     transaction_hash, idempotency_key, chain_id, status, description, balance_after, created_at, \
     api_key_id";

/// Column list for `api_keys`, excluding `key_hash`.
pub const API_KEY_COLUMNS: &str =
    "id, user_id, name, domain, key_masked, is_active, usage_count, created_at, last_used";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    address: String,
    credits: i64,
    total_spent_cents: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.parse::<UserId>().map_err(corrupt)?,
            address: WalletAddress::parse(&row.address).map_err(corrupt)?,
            credits: row.credits,
            total_spent_cents: row.total_spent_cents,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login: row.last_login,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TransactionRow {
    id: String,
    user_id: String,
    #[sqlx(rename = "type")]
    transaction_type: String,
    credits: i64,
    amount_cents: i64,
    commission: i64,
    transaction_hash: Option<String>,
    idempotency_key: Option<String>,
    chain_id: Option<i64>,
    status: String,
    description: Option<String>,
    balance_after: i64,
    created_at: DateTime<Utc>,
    api_key_id: Option<String>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.parse::<TransactionId>().map_err(corrupt)?,
            user_id: row.user_id.parse::<UserId>().map_err(corrupt)?,
            transaction_type: row
                .transaction_type
                .parse::<TransactionType>()
                .map_err(corrupt)?,
            credits: row.credits,
            amount_cents: row.amount_cents,
            commission: row.commission,
            transaction_hash: row.transaction_hash,
            idempotency_key: row.idempotency_key,
            api_key_id: row
                .api_key_id
                .map(|id| id.parse::<ApiKeyId>())
                .transpose()
                .map_err(corrupt)?,
            chain_id: row.chain_id,
            status: row.status.parse::<TransactionStatus>().map_err(corrupt)?,
            description: row.description,
            balance_after: row.balance_after,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ApiKeyRow {
    id: String,
    user_id: String,
    name: String,
    domain: Option<String>,
    key_masked: String,
    is_active: bool,
    usage_count: i64,
    created_at: DateTime<Utc>,
    last_used: Option<DateTime<Utc>>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = StoreError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.parse::<ApiKeyId>().map_err(corrupt)?,
            user_id: row.user_id.parse::<UserId>().map_err(corrupt)?,
            name: row.name,
            domain: row.domain,
            key_masked: row.key_masked,
            is_active: row.is_active,
            usage_count: row.usage_count,
            created_at: row.created_at,
            last_used: row.last_used,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserSummaryRow {
    #[sqlx(flatten)]
    user: UserRow,
    key_count: i64,
    credits_used: i64,
}

impl TryFrom<UserSummaryRow> for UserSummary {
    type Error = StoreError;

    fn try_from(row: UserSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user: row.user.try_into()?,
            key_count: row.key_count,
            credits_used: row.credits_used,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LedgerEntryRow {
    #[sqlx(flatten)]
    transaction: TransactionRow,
    address: String,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction: row.transaction.try_into()?,
            address: WalletAddress::parse(&row.address).map_err(corrupt)?,
        })
    }
}

/// `day` is the `YYYY-MM-DD` prefix of `created_at`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DailyUsageRow {
    day: String,
    requests: i64,
    credits: i64,
}

impl TryFrom<DailyUsageRow> for DailyUsage {
    type Error = StoreError;

    fn try_from(row: DailyUsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            date: NaiveDate::parse_from_str(&row.day, "%Y-%m-%d").map_err(corrupt)?,
            requests: row.requests,
            credits: row.credits,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct KeyUsageRow {
    id: String,
    name: String,
    key_masked: String,
    is_active: bool,
    requests: i64,
    credits: i64,
}

impl TryFrom<KeyUsageRow> for KeyUsage {
    type Error = StoreError;

    fn try_from(row: KeyUsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key_id: row.id.parse::<ApiKeyId>().map_err(corrupt)?,
            name: row.name,
            key_masked: row.key_masked,
            is_active: row.is_active,
            requests: row.requests,
            credits: row.credits,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatsRow {
    total_users: i64,
    active_users: i64,
    total_keys: i64,
    active_keys: i64,
    credits_sold: i64,
    commission_credits: i64,
    revenue_cents: i64,
    credits_used: i64,
}

impl From<StatsRow> for LedgerStats {
    fn from(row: StatsRow) -> Self {
        Self {
            total_users: row.total_users,
            active_users: row.active_users,
            total_keys: row.total_keys,
            active_keys: row.active_keys,
            credits_sold: row.credits_sold,
            commission_credits: row.commission_credits,
            revenue_cents: row.revenue_cents,
            credits_used: row.credits_used,
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}
