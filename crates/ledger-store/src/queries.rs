//! Statement helpers.
//!
//! Every function takes a bare connection so the same statement can run on a
//! pooled connection or inside an open transaction. Balance updates are
//! written so the statement itself carries the guard (`WHERE credits >= ?`),
//! and each returns `None` when no row matched.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    ApiKey, ApiKeyId, CreditTransaction, DailyUsage, KeyUsage, LedgerEntry, LedgerStats, User,
    UserId, UserSummary, WalletAddress,
};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::schema::{
    ApiKeyRow, DailyUsageRow, KeyUsageRow, LedgerEntryRow, StatsRow, TransactionRow, UserRow,
    UserSummaryRow, API_KEY_COLUMNS, TRANSACTION_COLUMNS, USER_COLUMNS,
};

// =============================================================================
// Users
// =============================================================================

/// Insert a fresh user for `address`, or bump `last_login` on the existing row.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn upsert_user(
    conn: &mut SqliteConnection,
    address: &WalletAddress,
    now: DateTime<Utc>,
) -> Result<User> {
    let sql = format!(
        "INSERT INTO users (id, address, credits, total_spent_cents, is_active, created_at, updated_at, last_login) \
         VALUES (?, ?, 0, 0, 1, ?, ?, ?) \
         ON CONFLICT (address) DO UPDATE SET last_login = excluded.last_login \
         RETURNING {USER_COLUMNS}"
    );
    let row: UserRow = sqlx::query_as(&sql)
        .bind(UserId::generate().to_string())
        .bind(address.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
    row.try_into()
}

/// Fetch a user by id.
///
/// # Errors
///
/// Returns an error if the statement fails or the row is corrupt.
pub async fn get_user(conn: &mut SqliteConnection, user_id: &UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(User::try_from).transpose()
}

/// Fetch a user by normalized address.
///
/// # Errors
///
/// Returns an error if the statement fails or the row is corrupt.
pub async fn get_user_by_address(
    conn: &mut SqliteConnection,
    address: &WalletAddress,
) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE address = ?");
    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(address.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(User::try_from).transpose()
}

/// Current balance, or `None` if the user does not exist.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn user_balance(conn: &mut SqliteConnection, user_id: &UserId) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar("SELECT credits FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance)
}

/// Add purchased credits and money spent. Returns the new balance, or `None`
/// if the user is missing or either total would pass `i64::MAX`.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn credit_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    credits: i64,
    spent_cents: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar(
        "UPDATE users SET credits = credits + ?, total_spent_cents = total_spent_cents + ?, \
         updated_at = ? WHERE id = ? AND credits <= ? AND total_spent_cents <= ? \
         RETURNING credits",
    )
    .bind(credits)
    .bind(spent_cents)
    .bind(now)
    .bind(user_id.to_string())
    .bind(i64::MAX.saturating_sub(credits))
    .bind(i64::MAX.saturating_sub(spent_cents))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(balance)
}

/// Subtract `credits` only if the balance covers it. Returns the new balance,
/// or `None` if the user is missing or short.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn debit_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    credits: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar(
        "UPDATE users SET credits = credits - ?, updated_at = ? \
         WHERE id = ? AND credits >= ? RETURNING credits",
    )
    .bind(credits)
    .bind(now)
    .bind(user_id.to_string())
    .bind(credits)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(balance)
}

/// Apply a signed delta only if the result stays non-negative.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn adjust_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let balance = sqlx::query_scalar(
        "UPDATE users SET credits = credits + ?, updated_at = ? \
         WHERE id = ? AND credits + ? >= 0 RETURNING credits",
    )
    .bind(delta)
    .bind(now)
    .bind(user_id.to_string())
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(balance)
}

/// Enable or disable a user. Returns `false` if no such user exists.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn set_user_active(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    active: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let done = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(now)
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() == 1)
}

// =============================================================================
// Transactions
// =============================================================================

/// Insert a ledger row. A reused hash or idempotency key comes back as
/// `StoreError::Conflict`.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx: &CreditTransaction,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO transactions ({TRANSACTION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(tx.id.to_string())
        .bind(tx.user_id.to_string())
        .bind(tx.transaction_type.as_str())
        .bind(tx.credits)
        .bind(tx.amount_cents)
        .bind(tx.commission)
        .bind(tx.transaction_hash.as_deref())
        .bind(tx.idempotency_key.as_deref())
        .bind(tx.chain_id)
        .bind(tx.status.as_str())
        .bind(tx.description.as_deref())
        .bind(tx.balance_after)
        .bind(tx.created_at)
        .bind(tx.api_key_id.map(|id| id.to_string()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Find a ledger row by its on-chain hash, across all users.
///
/// # Errors
///
/// Returns an error if the statement fails or the row is corrupt.
pub async fn find_transaction_by_hash(
    conn: &mut SqliteConnection,
    tx_hash: &str,
) -> Result<Option<CreditTransaction>> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_hash = ?");
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(tx_hash)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(CreditTransaction::try_from).transpose()
}

/// A user's ledger rows, newest first.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn list_transactions(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    limit: i64,
    offset: i64,
) -> Result<Vec<CreditTransaction>> {
    // rowid follows commit order, which ULIDs minted in the same
    // millisecond do not.
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ? \
         ORDER BY rowid DESC LIMIT ? OFFSET ?"
    );
    let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(CreditTransaction::try_from).collect()
}

/// Number of ledger rows for a user.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn count_transactions(conn: &mut SqliteConnection, user_id: &UserId) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

// =============================================================================
// API keys
// =============================================================================

/// Insert an issued key with the digest of its token.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn insert_api_key(
    conn: &mut SqliteConnection,
    key: &ApiKey,
    key_hash: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO api_keys (id, user_id, key_hash, key_masked, name, domain, is_active, \
         usage_count, created_at, last_used) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(key.id.to_string())
    .bind(key.user_id.to_string())
    .bind(key_hash)
    .bind(&key.key_masked)
    .bind(&key.name)
    .bind(key.domain.as_deref())
    .bind(key.is_active)
    .bind(key.usage_count)
    .bind(key.created_at)
    .bind(key.last_used)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Look up a key by token digest, active or not.
///
/// # Errors
///
/// Returns an error if the statement fails or the row is corrupt.
pub async fn find_api_key_by_hash(
    conn: &mut SqliteConnection,
    key_hash: &str,
) -> Result<Option<ApiKey>> {
    let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?");
    let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
        .bind(key_hash)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(ApiKey::try_from).transpose()
}

/// A user's keys, newest first, revoked ones included.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn list_api_keys(conn: &mut SqliteConnection, user_id: &UserId) -> Result<Vec<ApiKey>> {
    let sql = format!(
        "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = ? ORDER BY rowid DESC"
    );
    let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
        .bind(user_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(ApiKey::try_from).collect()
}

/// Mark a key inactive. Returns `false` if the key does not exist or belongs
/// to someone else; revoking an already revoked key still returns `true`.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn deactivate_api_key(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    key_id: &ApiKeyId,
) -> Result<bool> {
    let done = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ? AND user_id = ?")
        .bind(key_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() == 1)
}

/// Bump a key's usage counter and last-used time.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn record_api_key_use(
    conn: &mut SqliteConnection,
    key_id: &ApiKeyId,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE api_keys SET usage_count = usage_count + 1, last_used = ? WHERE id = ?")
        .bind(now)
        .bind(key_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Reports
// =============================================================================
//
// Timestamps are stored as RFC 3339 text in UTC, so the first ten characters
// of `created_at` are the UTC day.

/// A user's usage per day from `since` on. Days without usage are absent.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn daily_usage(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    since: NaiveDate,
) -> Result<Vec<DailyUsage>> {
    let rows: Vec<DailyUsageRow> = sqlx::query_as(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS requests, \
         -SUM(credits) AS credits FROM transactions \
         WHERE user_id = ? AND type = 'usage' AND substr(created_at, 1, 10) >= ? \
         GROUP BY day ORDER BY day",
    )
    .bind(user_id.to_string())
    .bind(since.format("%Y-%m-%d").to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(DailyUsage::try_from).collect()
}

/// Usage from `since` on for each of a user's keys, idle keys included.
/// Heaviest first.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn usage_by_key(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    since: NaiveDate,
) -> Result<Vec<KeyUsage>> {
    let rows: Vec<KeyUsageRow> = sqlx::query_as(
        "SELECT k.id AS id, k.name AS name, k.key_masked AS key_masked, \
         k.is_active AS is_active, COUNT(t.id) AS requests, \
         COALESCE(-SUM(t.credits), 0) AS credits \
         FROM api_keys k LEFT JOIN transactions t ON t.api_key_id = k.id \
         AND t.type = 'usage' AND substr(t.created_at, 1, 10) >= ? \
         WHERE k.user_id = ? GROUP BY k.id ORDER BY credits DESC, k.rowid DESC",
    )
    .bind(since.format("%Y-%m-%d").to_string())
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(KeyUsage::try_from).collect()
}

/// Service-wide totals. Each figure is its own subquery so no join can
/// multiply another.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn ledger_stats(conn: &mut SqliteConnection) -> Result<LedgerStats> {
    let row: StatsRow = sqlx::query_as(
        "SELECT \
         (SELECT COUNT(*) FROM users) AS total_users, \
         (SELECT COUNT(*) FROM users WHERE is_active = 1) AS active_users, \
         (SELECT COUNT(*) FROM api_keys) AS total_keys, \
         (SELECT COUNT(*) FROM api_keys WHERE is_active = 1) AS active_keys, \
         (SELECT COALESCE(SUM(credits), 0) FROM transactions \
          WHERE type = 'purchase' AND status = 'completed') AS credits_sold, \
         (SELECT COALESCE(SUM(commission), 0) FROM transactions \
          WHERE type = 'purchase' AND status = 'completed') AS commission_credits, \
         (SELECT COALESCE(SUM(amount_cents), 0) FROM transactions \
          WHERE type = 'purchase' AND status = 'completed') AS revenue_cents, \
         (SELECT COALESCE(-SUM(credits), 0) FROM transactions \
          WHERE type = 'usage') AS credits_used",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.into())
}

/// A page of users, newest first, with key counts and lifetime usage.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn list_users(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<UserSummary>> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, \
         (SELECT COUNT(*) FROM api_keys k WHERE k.user_id = users.id) AS key_count, \
         (SELECT COALESCE(-SUM(t.credits), 0) FROM transactions t \
          WHERE t.user_id = users.id AND t.type = 'usage') AS credits_used \
         FROM users ORDER BY rowid DESC LIMIT ? OFFSET ?"
    );
    let rows: Vec<UserSummaryRow> = sqlx::query_as(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(UserSummary::try_from).collect()
}

/// Number of users.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn count_users(conn: &mut SqliteConnection) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// A page of every user's ledger rows, newest first, with owner addresses.
///
/// # Errors
///
/// Returns an error if the statement fails or a row is corrupt.
pub async fn list_all_transactions(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<LedgerEntry>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS}, \
         (SELECT address FROM users WHERE users.id = transactions.user_id) AS address \
         FROM transactions ORDER BY rowid DESC LIMIT ? OFFSET ?"
    );
    let rows: Vec<LedgerEntryRow> = sqlx::query_as(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(LedgerEntry::try_from).collect()
}

/// Number of ledger rows across all users.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub async fn count_all_transactions(conn: &mut SqliteConnection) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
