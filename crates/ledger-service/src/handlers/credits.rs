//! Credit balance, history and purchase handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger_core::{CreditTransaction, LedgerError};

use crate::auth::WalletAuth;
use crate::error::ApiError;
use crate::extract::{Json as JsonBody, Path, Query};
use crate::ledger::PurchaseReceipt;
use crate::state::AppState;

/// Largest page `history` serves.
const MAX_HISTORY_LIMIT: u32 = 100;

/// Default page size for `history`.
const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// One catalog entry.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    /// Package id.
    pub id: String,
    /// Gross credits.
    pub credits: i64,
    /// Credits received after commission.
    pub net_credits: i64,
    /// Price in cents.
    pub price_cents: i64,
}

/// Catalog response.
#[derive(Debug, Serialize)]
pub struct PackagesResponse {
    /// Available packages.
    pub packages: Vec<PackageResponse>,
    /// Commission withheld on purchase, in basis points.
    pub commission_bps: u32,
}

/// List credit packages.
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PackagesResponse>, ApiError> {
    let rate = state.engine.commission();
    let packages: Vec<PackageResponse> = state
        .engine
        .catalog()
        .packages()
        .iter()
        .map(|p| -> Result<PackageResponse, LedgerError> {
            Ok(PackageResponse {
                id: p.id.clone(),
                credits: p.credits,
                net_credits: rate.split(p.credits)?.0,
                price_cents: p.price_cents,
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(Json(PackagesResponse {
        packages,
        commission_bps: rate.bps(),
    }))
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Wallet address (lowercase).
    pub address: String,
    /// Current balance in credits.
    pub credits: i64,
    /// Lifetime spend in cents.
    pub total_spent_cents: i64,
}

/// Get current credit balance.
pub async fn get_balance(auth: WalletAuth) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        address: auth.user.address.to_string(),
        credits: auth.user.credits,
        total_spent_cents: auth.user.total_spent_cents,
    })
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size, 1 to 100 (default: 10).
    pub limit: Option<u32>,
    /// Rows to skip (default: 0).
    #[serde(default)]
    pub offset: u32,
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction type.
    #[serde(rename = "type")]
    pub transaction_type: String,
    /// Signed credit delta.
    pub credits: i64,
    /// Money paid in cents.
    pub amount_cents: i64,
    /// Credits withheld as commission.
    pub commission: i64,
    /// On-chain hash, for purchases.
    pub transaction_hash: Option<String>,
    /// Chain id, for purchases.
    pub chain_id: Option<i64>,
    /// API key a usage debit was billed through.
    pub api_key_id: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Description.
    pub description: Option<String>,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            transaction_type: tx.transaction_type.to_string(),
            credits: tx.credits,
            amount_cents: tx.amount_cents,
            commission: tx.commission,
            transaction_hash: tx.transaction_hash.clone(),
            chain_id: tx.chain_id,
            api_key_id: tx.api_key_id.map(|id| id.to_string()),
            status: tx.status.to_string(),
            description: tx.description.clone(),
            balance_after: tx.balance_after,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Total rows for this user.
    pub total: i64,
    /// Page size used.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }

    let user_id = auth.user.id;
    let rows = state
        .store
        .list_transactions(&user_id, limit, query.offset)
        .await?;
    let total = state.store.count_transactions(&user_id).await?;

    let shown = i64::from(query.offset) + i64::try_from(rows.len()).unwrap_or(i64::MAX);
    Ok(Json(HistoryResponse {
        transactions: rows.iter().map(TransactionResponse::from).collect(),
        total,
        limit,
        offset: query.offset,
        has_more: shown < total,
    }))
}

/// Get one of the caller's transactions by on-chain hash.
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let tx_hash = tx_hash.trim().to_ascii_lowercase();
    let tx = state
        .store
        .find_user_transaction_by_hash(&auth.user.id, &tx_hash)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("transaction {tx_hash}")))?;

    Ok(Json(TransactionResponse::from(&tx)))
}

/// Purchase request.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// On-chain payment transaction hash.
    pub tx_hash: String,
    /// Catalog package id.
    pub package_id: String,
    /// Chain the payment was made on.
    pub chain_id: Option<i64>,
}

/// Credit a confirmed on-chain purchase.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    JsonBody(body): JsonBody<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseReceipt>), ApiError> {
    let receipt = state
        .engine
        .purchase_package(auth.user.id, &body.package_id, body.tx_hash, body.chain_id)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}
