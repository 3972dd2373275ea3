//! Ledger property tests: idempotency, balance guards and concurrency.

mod common;

use std::sync::Arc;

use common::{address, TestHarness};
use ledger_core::{
    CommissionRate, LedgerError, PurchaseDetails, TransactionStatus, TransactionType,
};

fn purchase(tx_hash: &str, credits: i64, amount_cents: i64) -> PurchaseDetails {
    PurchaseDetails {
        tx_hash: tx_hash.to_string(),
        package_credits: credits,
        amount_cents,
        chain_id: Some(1),
        description: Some(format!("{credits} credits")),
    }
}

fn two_percent() -> CommissionRate {
    CommissionRate::from_bps(200).unwrap()
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn get_or_create_user_keeps_balance() {
    let harness = TestHarness::new().await;
    let wallet = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    let funded = harness.funded_user(wallet, 40).await;

    let again = harness.user(wallet).await;
    assert_eq!(again.id, funded.id);
    assert_eq!(again.credits, 40);

    // Checksummed input resolves to the same user.
    let checksummed = harness
        .user("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
        .await;
    assert_eq!(checksummed.id, funded.id);
    assert_eq!(checksummed.credits, 40);
}

// ============================================================================
// Purchases
// ============================================================================

#[tokio::test]
async fn purchase_scenario_credits_net_of_commission() {
    let harness = TestHarness::new().await;
    let user = harness.user(&address(2)).await;
    let engine = &harness.state.engine;

    let receipt = engine
        .apply_purchase(user.id, purchase("0xabc", 500, 4_500), two_percent())
        .await
        .unwrap();
    assert_eq!(receipt.credits_added, 490);
    assert_eq!(receipt.commission, 10);
    assert_eq!(receipt.balance, 490);

    let stored = harness.store().get_user(&user.id).await.unwrap();
    assert_eq!(stored.credits, 490);
    assert_eq!(stored.total_spent_cents, 4_500);

    let rows = harness
        .store()
        .list_transactions(&user.id, 10, 0)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].transaction_type, TransactionType::Purchase);
    assert_eq!(rows[0].status, TransactionStatus::Completed);
    assert_eq!(rows[0].credits, 490);
    assert_eq!(rows[0].transaction_hash.as_deref(), Some("0xabc"));

    // The duplicate is rejected and changes nothing.
    let err = engine
        .apply_purchase(user.id, purchase("0xabc", 500, 4_500), two_percent())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction { .. }));
    let stored = harness.store().get_user(&user.id).await.unwrap();
    assert_eq!(stored.credits, 490);
    assert_eq!(stored.total_spent_cents, 4_500);
    assert_eq!(harness.store().count_transactions(&user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn hash_is_unique_across_users_and_case() {
    let harness = TestHarness::new().await;
    let alice = harness.user(&address(3)).await;
    let bob = harness.user(&address(4)).await;
    let engine = &harness.state.engine;

    engine
        .apply_purchase(alice.id, purchase("0xDEADBEEF", 500, 4_500), two_percent())
        .await
        .unwrap();

    let err = engine
        .apply_purchase(bob.id, purchase(" 0xdeadbeef ", 500, 4_500), two_percent())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction { .. }));
    assert_eq!(harness.store().balance(&bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn purchase_rejects_bad_input() {
    let harness = TestHarness::new().await;
    let user = harness.user(&address(5)).await;
    let engine = &harness.state.engine;

    assert!(matches!(
        engine
            .apply_purchase(user.id, purchase("  ", 500, 4_500), two_percent())
            .await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        engine
            .apply_purchase(user.id, purchase("0x1", 0, 4_500), two_percent())
            .await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        engine
            .purchase_package(user.id, "package_7", "0x2".into(), None)
            .await,
        Err(LedgerError::UnknownPackage(_))
    ));
    assert_eq!(harness.store().count_transactions(&user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn purchase_package_uses_catalog_price() {
    let harness = TestHarness::new().await;
    let user = harness.user(&address(6)).await;

    let receipt = harness
        .state
        .engine
        .purchase_package(user.id, "package_1000", "0xfeed".into(), Some(137))
        .await
        .unwrap();
    assert_eq!(receipt.credits_added, 980);

    let stored = harness.store().get_user(&user.id).await.unwrap();
    assert_eq!(stored.total_spent_cents, 8_500);
    let tx = harness
        .store()
        .find_transaction_by_hash("0xfeed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.chain_id, Some(137));
    assert_eq!(tx.amount_cents, 8_500);
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn usage_above_balance_changes_nothing() {
    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(7), 3).await;

    let err = harness
        .state
        .engine
        .apply_usage(user.id, 5, "Widget generate".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientCredits {
            balance: 3,
            required: 5
        }
    ));
    assert_eq!(harness.store().balance(&user.id).await.unwrap(), 3);
    // Only the funding adjustment is on the ledger.
    assert_eq!(harness.store().count_transactions(&user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn usage_records_debit_and_balance_after() {
    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(8), 10).await;

    let receipt = harness
        .state
        .engine
        .apply_usage(user.id, 4, "Widget analyze".into(), None)
        .await
        .unwrap();
    assert_eq!(receipt.credits_used, 4);
    assert_eq!(receipt.balance, 6);

    let rows = harness
        .store()
        .list_transactions(&user.id, 1, 0)
        .await
        .unwrap();
    assert_eq!(rows[0].transaction_type, TransactionType::Usage);
    assert_eq!(rows[0].credits, -4);
    assert_eq!(rows[0].balance_after, 6);
}

#[tokio::test]
async fn usage_rejects_non_positive_amounts() {
    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(9), 10).await;

    for credits in [0, -3] {
        assert!(matches!(
            harness
                .state
                .engine
                .apply_usage(user.id, credits, "Widget process".into(), None)
                .await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }
    assert_eq!(harness.store().balance(&user.id).await.unwrap(), 10);
}

#[tokio::test]
async fn repeated_idempotency_key_debits_once() {
    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(10), 10).await;
    let engine = &harness.state.engine;

    engine
        .apply_usage(user.id, 2, "Widget analyze".into(), Some("req-1".into()))
        .await
        .unwrap();
    let err = engine
        .apply_usage(user.id, 2, "Widget analyze".into(), Some("req-1".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTransaction { .. }));
    assert_eq!(harness.store().balance(&user.id).await.unwrap(), 8);

    // Keys are scoped per user.
    let other = harness.funded_user(&address(11), 5).await;
    engine
        .apply_usage(other.id, 2, "Widget analyze".into(), Some("req-1".into()))
        .await
        .unwrap();
}

// ============================================================================
// Adjustments
// ============================================================================

#[tokio::test]
async fn adjustment_cannot_go_negative() {
    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(12), 5).await;
    let engine = &harness.state.engine;

    let err = engine
        .apply_adjustment(user.id, -6, "Chargeback".into())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientCredits { .. }));

    let receipt = engine
        .apply_adjustment(user.id, -5, "Chargeback".into())
        .await
        .unwrap();
    assert_eq!(receipt.balance, 0);

    let rows = harness
        .store()
        .list_transactions(&user.id, 1, 0)
        .await
        .unwrap();
    assert_eq!(rows[0].transaction_type, TransactionType::AdminAdjustment);
    assert_eq!(rows[0].description.as_deref(), Some("Chargeback"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_purchases_apply_once() {
    const N: usize = 8;

    let harness = TestHarness::new().await;
    let user = harness.user(&address(13)).await;
    let engine = Arc::new(harness.state.engine.clone());

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .apply_purchase(user.id, purchase("0xrace", 500, 4_500), two_percent())
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::DuplicateTransaction { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(duplicates, N - 1);
    assert_eq!(harness.store().balance(&user.id).await.unwrap(), 490);
    assert_eq!(harness.store().count_transactions(&user.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_usage_never_overdraws() {
    const N: i64 = 10;
    const COST: i64 = 3;

    let harness = TestHarness::new().await;
    let user = harness.funded_user(&address(14), COST * (N - 1) + 1).await;
    let engine = Arc::new(harness.state.engine.clone());

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .apply_usage(user.id, COST, format!("Widget call {i}"), None)
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => {
                assert!(receipt.balance >= 0);
                succeeded += 1;
            }
            Err(LedgerError::InsufficientCredits { required, .. }) => {
                assert_eq!(required, COST);
                refused += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, N - 1);
    assert_eq!(refused, 1);
    assert_eq!(harness.store().balance(&user.id).await.unwrap(), 1);
}
