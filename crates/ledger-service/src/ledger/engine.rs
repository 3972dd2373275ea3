//! Credit transaction engine.
//!
//! Each operation is a single [`SqliteStore::with_transaction`] unit that
//! changes the balance and appends one ledger row. The first statement of
//! every unit is the balance `UPDATE`, so the unit holds the write lock
//! before it reads anything.

use chrono::Utc;
use serde::Serialize;

use ledger_core::{
    ApiKeyId, CommissionRate, CreditTransaction, LedgerError, PackageCatalog, PurchaseDetails,
    TransactionId, UserId,
};
use ledger_store::{queries, SqliteConnection, SqliteStore, StoreError};

/// Outcome of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    /// The ledger row written.
    pub transaction_id: TransactionId,
    /// Net credits added after commission.
    pub credits_added: i64,
    /// Credits withheld as commission.
    pub commission: i64,
    /// Balance after the purchase.
    pub balance: i64,
}

/// Outcome of a usage debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReceipt {
    /// The ledger row written.
    pub transaction_id: TransactionId,
    /// Credits deducted.
    pub credits_used: i64,
    /// Balance after the debit.
    pub balance: i64,
}

/// Outcome of an admin adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentReceipt {
    /// The ledger row written.
    pub transaction_id: TransactionId,
    /// Signed credit delta applied.
    pub amount: i64,
    /// Balance after the adjustment.
    pub balance: i64,
}

/// Applies balance changes to the ledger.
#[derive(Debug, Clone)]
pub struct CreditEngine {
    store: SqliteStore,
    catalog: PackageCatalog,
    commission: CommissionRate,
}

impl CreditEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub const fn new(
        store: SqliteStore,
        catalog: PackageCatalog,
        commission: CommissionRate,
    ) -> Self {
        Self {
            store,
            catalog,
            commission,
        }
    }

    /// The credit package catalog.
    #[must_use]
    pub const fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// The configured purchase commission.
    #[must_use]
    pub const fn commission(&self) -> CommissionRate {
        self.commission
    }

    /// Credit a confirmed on-chain purchase.
    ///
    /// The hash is the idempotency key: a hash already on the ledger, under
    /// any status, is rejected and nothing changes.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if the hash is empty or an amount is
    ///   out of range.
    /// - `LedgerError::DuplicateTransaction` if the hash was already used.
    /// - `LedgerError::UserNotFound` if the user does not exist.
    /// - `LedgerError::StoreUnavailable` if the store fails.
    pub async fn apply_purchase(
        &self,
        user_id: UserId,
        mut purchase: PurchaseDetails,
        rate: CommissionRate,
    ) -> ledger_core::Result<PurchaseReceipt> {
        purchase.tx_hash = normalize_tx_hash(&purchase.tx_hash)?;
        if purchase.package_credits <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "package credits must be positive, got {}",
                purchase.package_credits
            )));
        }
        if purchase.amount_cents < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "amount paid cannot be negative, got {}",
                purchase.amount_cents
            )));
        }

        let (net, commission) = rate.split(purchase.package_credits)?;
        let tx_hash = purchase.tx_hash.clone();

        let receipt = self
            .store
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let Some(balance) = queries::credit_user(
                        conn,
                        &user_id,
                        net,
                        purchase.amount_cents,
                        Utc::now(),
                    )
                    .await?
                    else {
                        return Err(match queries::user_balance(conn, &user_id).await? {
                            Some(_) => LedgerError::InvalidAmount(
                                "purchase would overflow the balance".into(),
                            ),
                            None => user_not_found(&user_id),
                        });
                    };

                    let tx =
                        CreditTransaction::purchase(user_id, &purchase, net, commission, balance);
                    insert_or_duplicate(conn, &tx, &purchase.tx_hash).await?;

                    Ok::<_, LedgerError>(PurchaseReceipt {
                        transaction_id: tx.id,
                        credits_added: net,
                        commission,
                        balance,
                    })
                })
            })
            .await;

        match &receipt {
            Ok(r) => tracing::info!(
                user_id = %user_id,
                tx_hash = %tx_hash,
                credits = r.credits_added,
                commission = r.commission,
                balance = r.balance,
                "Purchase applied"
            ),
            Err(LedgerError::DuplicateTransaction { .. }) => {
                tracing::info!(user_id = %user_id, tx_hash = %tx_hash, "Duplicate purchase rejected");
            }
            Err(_) => {}
        }

        receipt
    }

    /// Credit a purchase of a catalog package at the configured commission.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownPackage` if the package id is not in the
    /// catalog, otherwise as [`Self::apply_purchase`].
    pub async fn purchase_package(
        &self,
        user_id: UserId,
        package_id: &str,
        tx_hash: String,
        chain_id: Option<i64>,
    ) -> ledger_core::Result<PurchaseReceipt> {
        let package = self
            .catalog
            .get(package_id)
            .ok_or_else(|| LedgerError::UnknownPackage(package_id.to_string()))?;

        let purchase = PurchaseDetails {
            tx_hash,
            package_credits: package.credits,
            amount_cents: package.price_cents,
            chain_id,
            description: Some(format!("Purchased {}", package.id)),
        };
        self.apply_purchase(user_id, purchase, self.commission).await
    }

    /// Debit `credits` for usage.
    ///
    /// The debit only lands if the balance covers it; otherwise nothing is
    /// written. A reused `idempotency_key` for the same user is rejected.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `credits` is not positive.
    /// - `LedgerError::InsufficientCredits` if the balance is too low.
    /// - `LedgerError::DuplicateTransaction` if the idempotency key was used.
    /// - `LedgerError::UserNotFound` if the user does not exist.
    /// - `LedgerError::StoreUnavailable` if the store fails.
    pub async fn apply_usage(
        &self,
        user_id: UserId,
        credits: i64,
        description: String,
        idempotency_key: Option<String>,
    ) -> ledger_core::Result<UsageReceipt> {
        self.debit(user_id, credits, description, idempotency_key, None)
            .await
    }

    /// As [`Self::apply_usage`], recording `key_id` on the ledger row so
    /// usage reports can break it down per key.
    ///
    /// # Errors
    ///
    /// As [`Self::apply_usage`].
    pub async fn apply_key_usage(
        &self,
        key_id: ApiKeyId,
        user_id: UserId,
        credits: i64,
        description: String,
        idempotency_key: Option<String>,
    ) -> ledger_core::Result<UsageReceipt> {
        self.debit(user_id, credits, description, idempotency_key, Some(key_id))
            .await
    }

    async fn debit(
        &self,
        user_id: UserId,
        credits: i64,
        description: String,
        idempotency_key: Option<String>,
        key_id: Option<ApiKeyId>,
    ) -> ledger_core::Result<UsageReceipt> {
        if credits <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "usage must be a positive number of credits, got {credits}"
            )));
        }

        let receipt = self
            .store
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let Some(balance) =
                        queries::debit_user(conn, &user_id, credits, Utc::now()).await?
                    else {
                        return Err(shortfall(conn, &user_id, credits).await);
                    };

                    let mut tx = CreditTransaction::usage(
                        user_id,
                        credits,
                        description,
                        idempotency_key,
                        balance,
                    );
                    tx.api_key_id = key_id;
                    let key = tx
                        .idempotency_key
                        .clone()
                        .unwrap_or_else(|| tx.id.to_string());
                    insert_or_duplicate(conn, &tx, &key).await?;

                    Ok(UsageReceipt {
                        transaction_id: tx.id,
                        credits_used: credits,
                        balance,
                    })
                })
            })
            .await;

        if let Ok(r) = &receipt {
            tracing::info!(
                user_id = %user_id,
                key_id = ?key_id,
                credits = credits,
                balance = r.balance,
                "Usage debited"
            );
        }

        receipt
    }

    /// Apply an administrative correction of `amount` credits.
    ///
    /// Positive amounts always land. Negative amounts land only if the
    /// balance stays non-negative.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is zero.
    /// - `LedgerError::InvalidInput` if `reason` is blank.
    /// - `LedgerError::InsufficientCredits` if a debit would go negative.
    /// - `LedgerError::UserNotFound` if the user does not exist.
    /// - `LedgerError::StoreUnavailable` if the store fails.
    pub async fn apply_adjustment(
        &self,
        user_id: UserId,
        amount: i64,
        reason: String,
    ) -> ledger_core::Result<AdjustmentReceipt> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "adjustment amount cannot be zero".into(),
            ));
        }
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(LedgerError::InvalidInput(
                "adjustment reason is required".into(),
            ));
        }

        let receipt = self
            .store
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let Some(balance) =
                        queries::adjust_user(conn, &user_id, amount, Utc::now()).await?
                    else {
                        return Err(shortfall(conn, &user_id, -amount).await);
                    };

                    let tx = CreditTransaction::adjustment(user_id, amount, reason, balance);
                    queries::insert_transaction(conn, &tx).await?;

                    Ok(AdjustmentReceipt {
                        transaction_id: tx.id,
                        amount,
                        balance,
                    })
                })
            })
            .await;

        if let Ok(r) = &receipt {
            tracing::info!(
                user_id = %user_id,
                credits = amount,
                balance = r.balance,
                "Admin adjustment applied"
            );
        }

        receipt
    }
}

/// Trimmed, lowercased hash; hex hashes differing only in case name the same
/// on-chain transaction.
fn normalize_tx_hash(raw: &str) -> ledger_core::Result<String> {
    let hash = raw.trim();
    if hash.is_empty() {
        return Err(LedgerError::InvalidAmount(
            "transaction hash is required".into(),
        ));
    }
    Ok(hash.to_ascii_lowercase())
}

/// Insert a ledger row, reporting a UNIQUE collision as a duplicate of `key`.
async fn insert_or_duplicate(
    conn: &mut SqliteConnection,
    tx: &CreditTransaction,
    key: &str,
) -> ledger_core::Result<()> {
    match queries::insert_transaction(conn, tx).await {
        Ok(()) => Ok(()),
        Err(StoreError::Conflict(_)) => Err(LedgerError::DuplicateTransaction {
            key: key.to_string(),
        }),
        Err(other) => Err(other.into()),
    }
}

/// Why a guarded debit matched no row: the user is short, or missing.
async fn shortfall(conn: &mut SqliteConnection, user_id: &UserId, required: i64) -> LedgerError {
    match queries::user_balance(conn, user_id).await {
        Ok(Some(balance)) => LedgerError::InsufficientCredits { balance, required },
        Ok(None) => user_not_found(user_id),
        Err(err) => err.into(),
    }
}

fn user_not_found(user_id: &UserId) -> LedgerError {
    LedgerError::UserNotFound {
        user_id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::StoreConfig;
    use tempfile::TempDir;

    const ADDRESS: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    async fn engine() -> (CreditEngine, SqliteStore, UserId, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&StoreConfig::for_path(dir.path().join("ledger.db")))
            .await
            .unwrap();
        let user = store.get_or_create_user(ADDRESS).await.unwrap();
        let engine = CreditEngine::new(
            store.clone(),
            PackageCatalog::default(),
            CommissionRate::default(),
        );
        (engine, store, user.id, dir)
    }

    #[test]
    fn tx_hash_is_normalized() {
        assert_eq!(normalize_tx_hash("  0xABcd ").unwrap(), "0xabcd");
        assert!(matches!(
            normalize_tx_hash("   "),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn purchase_package_uses_catalog_price() {
        let (engine, store, user_id, _dir) = engine().await;

        let receipt = engine
            .purchase_package(user_id, "package_1000", "0xBEEF".into(), Some(8453))
            .await
            .unwrap();
        assert_eq!(receipt.credits_added, 980);
        assert_eq!(receipt.commission, 20);

        let user = store.get_user(&user_id).await.unwrap();
        assert_eq!(user.total_spent_cents, 8_500);

        let row = store.find_transaction_by_hash("0xbeef").await.unwrap().unwrap();
        assert_eq!(row.chain_id, Some(8453));
    }

    #[tokio::test]
    async fn oversized_purchase_is_invalid_amount() {
        let (engine, store, user_id, _dir) = engine().await;

        let err = engine
            .apply_purchase(
                user_id,
                PurchaseDetails {
                    tx_hash: "0xbig".into(),
                    package_credits: i64::MAX / 100,
                    amount_cents: 100,
                    chain_id: None,
                    description: None,
                },
                CommissionRate::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert_eq!(store.get_user(&user_id).await.unwrap().credits, 0);
        assert!(store.find_transaction_by_hash("0xbig").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purchase_past_max_balance_is_invalid_amount() {
        let (engine, store, user_id, _dir) = engine().await;
        let zero = CommissionRate::from_bps(0).unwrap();
        let details = |hash: &str, credits: i64| PurchaseDetails {
            tx_hash: hash.into(),
            package_credits: credits,
            amount_cents: 0,
            chain_id: None,
            description: None,
        };

        engine
            .apply_purchase(user_id, details("0x1", i64::MAX - 10), zero)
            .await
            .unwrap();
        let err = engine
            .apply_purchase(user_id, details("0x2", 11), zero)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        assert_eq!(store.get_user(&user_id).await.unwrap().credits, i64::MAX - 10);
        // The rejected hash was rolled back and stays usable.
        assert!(store.find_transaction_by_hash("0x2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_package_is_rejected() {
        let (engine, _store, user_id, _dir) = engine().await;
        let err = engine
            .purchase_package(user_id, "package_1", "0x1".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownPackage(_)));
    }

    #[tokio::test]
    async fn usage_on_missing_user_is_not_found() {
        let (engine, _store, _user_id, _dir) = engine().await;
        let err = engine
            .apply_usage(UserId::generate(), 1, "call".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound { .. }));
    }

    #[tokio::test]
    async fn adjustment_cannot_go_negative() {
        let (engine, store, user_id, _dir) = engine().await;

        engine
            .apply_adjustment(user_id, 5, "goodwill".into())
            .await
            .unwrap();
        let err = engine
            .apply_adjustment(user_id, -6, "chargeback".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                balance: 5,
                required: 6
            }
        ));

        let receipt = engine
            .apply_adjustment(user_id, -5, "chargeback".into())
            .await
            .unwrap();
        assert_eq!(receipt.balance, 0);
        assert_eq!(store.count_transactions(&user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn adjustment_requires_reason_and_amount() {
        let (engine, _store, user_id, _dir) = engine().await;
        assert!(matches!(
            engine.apply_adjustment(user_id, 0, "x".into()).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.apply_adjustment(user_id, 3, "  ".into()).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }
}
