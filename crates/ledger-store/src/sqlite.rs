//! `SQLite` storage implementation.
//!
//! The pool runs in WAL mode with a busy timeout, so concurrent writers queue
//! on the database lock instead of failing. Atomic units must open with a
//! write statement: a unit that reads first and writes later can be refused
//! the lock upgrade outright.

use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;
use ledger_core::{
    ApiKey, ApiKeyId, CreditTransaction, DailyUsage, KeyUsage, LedgerEntry, LedgerError,
    LedgerStats, User, UserId, UserSummary, WalletAddress,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqliteConnection;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::queries;

/// SQLite-backed ledger storage.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    tx_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if missing) the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(url = %config.database_url, "ledger store opened");

        Ok(Self {
            pool,
            tx_timeout: config.tx_timeout,
        })
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check the database answers.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can run a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Run `f` as one atomic unit.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`. A unit that
    /// outlives the configured deadline is abandoned and rolled back, as is
    /// one whose future is dropped mid-flight.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or a converted `StoreError` if the unit
    /// cannot begin, commit, or finish in time.
    pub async fn with_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, std::result::Result<T, E>>
            + Send,
    {
        let unit = async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
            match f(&mut *tx).await {
                Ok(value) => {
                    tx.commit().await.map_err(StoreError::from)?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "rollback failed");
                    }
                    Err(err)
                }
            }
        };

        if let Ok(result) = tokio::time::timeout(self.tx_timeout, unit).await {
            result
        } else {
            tracing::warn!(timeout = ?self.tx_timeout, "atomic unit timed out");
            Err(StoreError::Timeout.into())
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Return the user for `address`, creating it on first sight.
    ///
    /// Concurrent first requests for the same address resolve to one row.
    /// Every call refreshes `last_login`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAddress` if the address fails validation.
    /// - `LedgerError::StoreUnavailable` if the store fails.
    pub async fn get_or_create_user(&self, address: &str) -> ledger_core::Result<User> {
        let address = WalletAddress::parse(address)?;
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        let user = queries::upsert_user(&mut conn, &address, Utc::now()).await?;
        Ok(user)
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if there is no such user.
    pub async fn get_user(&self, user_id: &UserId) -> ledger_core::Result<User> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        queries::get_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Fetch a user by address without creating one.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn get_user_by_address(
        &self,
        address: &WalletAddress,
    ) -> ledger_core::Result<Option<User>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::get_user_by_address(&mut conn, address).await?)
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if there is no such user.
    pub async fn balance(&self, user_id: &UserId) -> ledger_core::Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        queries::user_balance(&mut conn, user_id)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Enable or disable a user's API access.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if there is no such user.
    pub async fn set_user_active(&self, user_id: &UserId, active: bool) -> ledger_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        if queries::set_user_active(&mut conn, user_id, active, Utc::now()).await? {
            Ok(())
        } else {
            Err(LedgerError::UserNotFound {
                user_id: user_id.to_string(),
            })
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// A page of a user's history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> ledger_core::Result<Vec<CreditTransaction>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(
            queries::list_transactions(&mut conn, user_id, i64::from(limit), i64::from(offset))
                .await?,
        )
    }

    /// Total ledger rows for a user.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn count_transactions(&self, user_id: &UserId) -> ledger_core::Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::count_transactions(&mut conn, user_id).await?)
    }

    /// Look up a ledger row by on-chain hash, whoever owns it.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn find_transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> ledger_core::Result<Option<CreditTransaction>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::find_transaction_by_hash(&mut conn, tx_hash).await?)
    }

    /// Look up a ledger row by on-chain hash, only if `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn find_user_transaction_by_hash(
        &self,
        user_id: &UserId,
        tx_hash: &str,
    ) -> ledger_core::Result<Option<CreditTransaction>> {
        Ok(self
            .find_transaction_by_hash(tx_hash)
            .await?
            .filter(|tx| tx.user_id == *user_id))
    }

    // =========================================================================
    // API keys
    // =========================================================================

    /// Persist a newly issued key.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn insert_api_key(&self, key: &ApiKey, key_hash: &str) -> ledger_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        queries::insert_api_key(&mut conn, key, key_hash).await?;
        Ok(())
    }

    /// Look up a key by token digest.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn find_api_key_by_hash(&self, key_hash: &str) -> ledger_core::Result<Option<ApiKey>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::find_api_key_by_hash(&mut conn, key_hash).await?)
    }

    /// All of a user's keys, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn list_api_keys(&self, user_id: &UserId) -> ledger_core::Result<Vec<ApiKey>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::list_api_keys(&mut conn, user_id).await?)
    }

    /// Deactivate one of `user_id`'s keys.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::KeyNotFound` if the key does not exist or is
    /// owned by another user.
    pub async fn deactivate_api_key(
        &self,
        user_id: &UserId,
        key_id: &ApiKeyId,
    ) -> ledger_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        if queries::deactivate_api_key(&mut conn, user_id, key_id).await? {
            Ok(())
        } else {
            Err(LedgerError::KeyNotFound {
                key_id: key_id.to_string(),
            })
        }
    }

    /// Count one billed call against a key.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn record_api_key_use(&self, key_id: &ApiKeyId) -> ledger_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        queries::record_api_key_use(&mut conn, key_id, Utc::now()).await?;
        Ok(())
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// A user's usage per UTC day from `since` on; idle days are absent.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn daily_usage(
        &self,
        user_id: &UserId,
        since: NaiveDate,
    ) -> ledger_core::Result<Vec<DailyUsage>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::daily_usage(&mut conn, user_id, since).await?)
    }

    /// Usage per key from `since` on, for all of a user's keys.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn usage_by_key(
        &self,
        user_id: &UserId,
        since: NaiveDate,
    ) -> ledger_core::Result<Vec<KeyUsage>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::usage_by_key(&mut conn, user_id, since).await?)
    }

    /// Service-wide totals.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn ledger_stats(&self) -> ledger_core::Result<LedgerStats> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::ledger_stats(&mut conn).await?)
    }

    /// A page of users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn list_users(
        &self,
        limit: u32,
        offset: u32,
    ) -> ledger_core::Result<Vec<UserSummary>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::list_users(&mut conn, i64::from(limit), i64::from(offset)).await?)
    }

    /// Number of users.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn count_users(&self) -> ledger_core::Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::count_users(&mut conn).await?)
    }

    /// A page of every user's history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn list_all_transactions(
        &self,
        limit: u32,
        offset: u32,
    ) -> ledger_core::Result<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(
            queries::list_all_transactions(&mut conn, i64::from(limit), i64::from(offset))
                .await?,
        )
    }

    /// Ledger rows across all users.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn count_all_transactions(&self) -> ledger_core::Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(queries::count_all_transactions(&mut conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::mask_token;
    use tempfile::TempDir;

    const ADDRESS: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    async fn create_test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&StoreConfig::for_path(dir.path().join("ledger.db")))
            .await
            .unwrap();
        (store, dir)
    }

    fn test_key(user_id: UserId, name: &str) -> ApiKey {
        ApiKey {
            id: ApiKeyId::generate(),
            user_id,
            name: name.to_string(),
            domain: None,
            key_masked: mask_token("sk_0123456789abcdef0123"),
            is_active: true,
            usage_count: 0,
            created_at: Utc::now(),
            last_used: None,
        }
    }

    #[tokio::test]
    async fn get_or_create_user_is_stable_per_address() {
        let (store, _dir) = create_test_store().await;

        let first = store.get_or_create_user(ADDRESS).await.unwrap();
        assert_eq!(first.credits, 0);
        assert!(first.is_active);

        // Mixed-case input with a valid checksum resolves to the same user.
        let again = store
            .get_or_create_user("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.last_login >= first.last_login);
    }

    #[tokio::test]
    async fn invalid_address_creates_nothing() {
        let (store, _dir) = create_test_store().await;

        let err = store.get_or_create_user("0x1234").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn missing_user_is_reported() {
        let (store, _dir) = create_test_store().await;
        let err = store.balance(&UserId::generate()).await.unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound { .. }));
    }

    #[tokio::test]
    async fn failed_unit_rolls_back() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();
        let user_id = user.id;

        let result: ledger_core::Result<()> = store
            .with_transaction(move |conn| {
                Box::pin(async move {
                    queries::credit_user(conn, &user_id, 100, 0, Utc::now()).await?;
                    Err(LedgerError::InvalidInput("abort".into()))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.balance(&user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unit_past_deadline_times_out_and_rolls_back() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            tx_timeout: Duration::from_millis(50),
            ..StoreConfig::for_path(dir.path().join("ledger.db"))
        };
        let store = SqliteStore::open(&config).await.unwrap();
        let user_id = store.get_or_create_user(ADDRESS).await.unwrap().id;

        let result: Result<()> = store
            .with_transaction(move |conn| {
                Box::pin(async move {
                    queries::credit_user(conn, &user_id, 100, 0, Utc::now()).await?;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
        assert_eq!(store.balance(&user_id).await.unwrap(), 0);

        // The abandoned unit released the write lock.
        let balance: Result<Option<i64>> = store
            .with_transaction(move |conn| {
                Box::pin(async move { queries::credit_user(conn, &user_id, 7, 0, Utc::now()).await })
            })
            .await;
        assert_eq!(balance.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let (store, _dir) = create_test_store().await;
        let user_id = store.get_or_create_user(ADDRESS).await.unwrap().id;
        let (wrote_tx, wrote_rx) = tokio::sync::oneshot::channel();

        let unit_store = store.clone();
        let handle = tokio::spawn(async move {
            let _: Result<()> = unit_store
                .with_transaction(move |conn| {
                    Box::pin(async move {
                        queries::credit_user(conn, &user_id, 100, 0, Utc::now()).await?;
                        let _ = wrote_tx.send(());
                        std::future::pending::<()>().await;
                        Ok(())
                    })
                })
                .await;
        });

        // Cancel the caller once the credit is written but not committed.
        wrote_rx.await.unwrap();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert_eq!(store.balance(&user_id).await.unwrap(), 0);
        let balance: Result<Option<i64>> = store
            .with_transaction(move |conn| {
                Box::pin(async move { queries::credit_user(conn, &user_id, 7, 0, Utc::now()).await })
            })
            .await;
        assert_eq!(balance.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn credit_guard_refuses_overflow() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        let full = queries::credit_user(&mut conn, &user.id, i64::MAX - 1, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(full, Some(i64::MAX - 1));

        let over = queries::credit_user(&mut conn, &user.id, 2, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(over, None);
        assert_eq!(store.balance(&user.id).await.unwrap(), i64::MAX - 1);
    }

    #[tokio::test]
    async fn duplicate_hash_is_a_conflict() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();

        let details = ledger_core::PurchaseDetails {
            tx_hash: "0xfeed".into(),
            package_credits: 500,
            amount_cents: 4_500,
            chain_id: Some(1),
            description: None,
        };
        let first = CreditTransaction::purchase(user.id, &details, 490, 10, 490);
        let second = CreditTransaction::purchase(user.id, &details, 490, 10, 980);

        let mut conn = store.pool().acquire().await.unwrap();
        queries::insert_transaction(&mut conn, &first).await.unwrap();
        let err = queries::insert_transaction(&mut conn, &second)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let found = store.find_transaction_by_hash("0xfeed").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(store
            .find_user_transaction_by_hash(&UserId::generate(), "0xfeed")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn debit_guard_refuses_overdraft() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        queries::credit_user(&mut conn, &user.id, 3, 0, Utc::now())
            .await
            .unwrap();

        let short = queries::debit_user(&mut conn, &user.id, 5, Utc::now())
            .await
            .unwrap();
        assert_eq!(short, None);

        let ok = queries::debit_user(&mut conn, &user.id, 3, Utc::now())
            .await
            .unwrap();
        assert_eq!(ok, Some(0));
    }

    #[tokio::test]
    async fn usage_reports_group_by_day_and_key() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();
        let site = test_key(user.id, "Site");
        let idle = test_key(user.id, "Idle");
        store.insert_api_key(&site, "hash-site").await.unwrap();
        store.insert_api_key(&idle, "hash-idle").await.unwrap();

        let today = Utc::now();
        let old = today - chrono::Duration::days(40);
        let mut conn = store.pool().acquire().await.unwrap();
        for (credits, at, key) in [
            (3, today, Some(site.id)),
            (2, today, Some(site.id)),
            (1, today, None),
            (5, old, Some(site.id)),
        ] {
            let mut tx = CreditTransaction::usage(user.id, credits, "call".into(), None, 0);
            tx.created_at = at;
            tx.api_key_id = key;
            queries::insert_transaction(&mut conn, &tx).await.unwrap();
        }
        // Not usage.
        let grant = CreditTransaction::adjustment(user.id, 50, "grant".into(), 50);
        queries::insert_transaction(&mut conn, &grant).await.unwrap();

        let since = (today - chrono::Duration::days(29)).date_naive();
        let daily = store.daily_usage(&user.id, since).await.unwrap();
        assert_eq!(
            daily,
            vec![DailyUsage {
                date: today.date_naive(),
                requests: 3,
                credits: 6,
            }]
        );

        let keys = store.usage_by_key(&user.id, since).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!((keys[0].key_id, keys[0].requests, keys[0].credits), (site.id, 2, 5));
        assert_eq!((keys[1].key_id, keys[1].requests, keys[1].credits), (idle.id, 0, 0));

        // Another user's report is empty.
        assert!(store
            .daily_usage(&UserId::generate(), since)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn stats_do_not_multiply_across_tables() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();
        for name in ["a", "b", "c"] {
            store
                .insert_api_key(&test_key(user.id, name), &format!("hash-{name}"))
                .await
                .unwrap();
        }

        let details = ledger_core::PurchaseDetails {
            tx_hash: "0xfeed".into(),
            package_credits: 500,
            amount_cents: 4_500,
            chain_id: Some(1),
            description: None,
        };
        let mut conn = store.pool().acquire().await.unwrap();
        let purchase = CreditTransaction::purchase(user.id, &details, 490, 10, 490);
        queries::insert_transaction(&mut conn, &purchase).await.unwrap();
        let usage = CreditTransaction::usage(user.id, 4, "call".into(), None, 486);
        queries::insert_transaction(&mut conn, &usage).await.unwrap();

        let stats = store.ledger_stats().await.unwrap();
        assert_eq!(
            stats,
            LedgerStats {
                total_users: 1,
                active_users: 1,
                total_keys: 3,
                active_keys: 3,
                credits_sold: 490,
                commission_credits: 10,
                revenue_cents: 4_500,
                credits_used: 4,
            }
        );

        let users = store.list_users(10, 0).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].key_count, 3);
        assert_eq!(users[0].credits_used, 4);
        assert_eq!(store.count_users().await.unwrap(), 1);

        let entries = store.list_all_transactions(10, 0).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transaction.id, usage.id);
        assert_eq!(entries[0].address.as_str(), ADDRESS);
        assert_eq!(store.count_all_transactions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn history_is_newest_first_with_total() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        for i in 1..=3 {
            let tx = CreditTransaction::adjustment(user.id, i, format!("grant {i}"), i);
            queries::insert_transaction(&mut conn, &tx).await.unwrap();
        }
        drop(conn);

        let page = store.list_transactions(&user.id, 2, 0).await.unwrap();
        assert_eq!(store.count_transactions(&user.id).await.unwrap(), 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].credits, 3);
        assert_eq!(page[1].credits, 2);

        let rest = store.list_transactions(&user.id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].credits, 1);
    }

    #[tokio::test]
    async fn api_key_lifecycle() {
        let (store, _dir) = create_test_store().await;
        let owner = store.get_or_create_user(ADDRESS).await.unwrap();
        let other = store
            .get_or_create_user("0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359")
            .await
            .unwrap();

        let key = test_key(owner.id, "site");
        store.insert_api_key(&key, "digest").await.unwrap();

        let found = store.find_api_key_by_hash("digest").await.unwrap().unwrap();
        assert_eq!(found.id, key.id);
        assert!(store.find_api_key_by_hash("other").await.unwrap().is_none());

        store.record_api_key_use(&key.id).await.unwrap();
        let listed = store.list_api_keys(&owner.id).await.unwrap();
        assert_eq!(listed[0].usage_count, 1);
        assert!(listed[0].last_used.is_some());

        // Another user cannot revoke it.
        let err = store
            .deactivate_api_key(&other.id, &key.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::KeyNotFound { .. }));

        // Revoking twice succeeds both times.
        store.deactivate_api_key(&owner.id, &key.id).await.unwrap();
        store.deactivate_api_key(&owner.id, &key.id).await.unwrap();
        assert!(!store.find_api_key_by_hash("digest").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn set_user_active_toggles_flag() {
        let (store, _dir) = create_test_store().await;
        let user = store.get_or_create_user(ADDRESS).await.unwrap();

        store.set_user_active(&user.id, false).await.unwrap();
        assert!(!store.get_user(&user.id).await.unwrap().is_active);

        let err = store
            .set_user_active(&UserId::generate(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound { .. }));
    }
}
