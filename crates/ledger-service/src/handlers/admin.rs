//! Admin handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger_core::{LedgerError, LedgerStats, User, WalletAddress};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::extract::{Json as JsonBody, Path, Query};
use crate::handlers::credits::TransactionResponse;
use crate::ledger::AdjustmentReceipt;
use crate::state::AppState;

/// Largest page the admin listings serve.
const MAX_PAGE_LIMIT: u32 = 100;

/// Default page size for `list_users`.
const DEFAULT_USERS_LIMIT: u32 = 20;

/// Default page size for `list_transactions`.
const DEFAULT_TRANSACTIONS_LIMIT: u32 = 50;

/// Adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Wallet address of the user to adjust.
    pub address: String,
    /// Signed credit delta.
    pub amount: i64,
    /// Recorded on the ledger row.
    pub reason: String,
}

/// Apply a manual credit correction.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    JsonBody(body): JsonBody<AdjustRequest>,
) -> Result<Json<AdjustmentReceipt>, ApiError> {
    let user = existing_user(&state, &body.address).await?;

    let receipt = state
        .engine
        .apply_adjustment(user.id, body.amount, body.reason)
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user.id,
        credits = body.amount,
        "Admin adjusted credits"
    );

    Ok(Json(receipt))
}

/// Activation request.
#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    /// New state.
    pub active: bool,
}

/// Activation response.
#[derive(Debug, Serialize)]
pub struct SetActiveResponse {
    /// Wallet address (lowercase).
    pub address: String,
    /// State now in effect.
    pub active: bool,
}

/// Enable or disable a user's API keys.
pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(address): Path<String>,
    JsonBody(body): JsonBody<SetActiveRequest>,
) -> Result<Json<SetActiveResponse>, ApiError> {
    let user = existing_user(&state, &address).await?;
    state.store.set_user_active(&user.id, body.active).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user.id,
        active = body.active,
        "Admin changed user state"
    );

    Ok(Json(SetActiveResponse {
        address: user.address.to_string(),
        active: body.active,
    }))
}

/// Service-wide totals.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<LedgerStats>, ApiError> {
    Ok(Json(state.store.ledger_stats().await?))
}

/// Admin listing query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Page size, 1 to 100.
    pub limit: Option<u32>,
    /// Rows to skip (default: 0).
    #[serde(default)]
    pub offset: u32,
}

impl PageQuery {
    fn limit_or(&self, default: u32) -> Result<u32, ApiError> {
        let limit = self.limit.unwrap_or(default);
        if (1..=MAX_PAGE_LIMIT).contains(&limit) {
            Ok(limit)
        } else {
            Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )))
        }
    }
}

/// One user in the admin listing.
#[derive(Debug, Serialize)]
pub struct AdminUserResponse {
    /// Wallet address (lowercase).
    pub address: String,
    /// Current balance.
    pub credits: i64,
    /// Lifetime spend in cents.
    pub total_spent_cents: i64,
    /// Whether API keys are accepted.
    pub is_active: bool,
    /// Keys issued, revoked ones included.
    pub key_count: i64,
    /// Credits debited for usage, all time.
    pub credits_used: i64,
    /// First seen.
    pub created_at: String,
    /// Last authenticated request.
    pub last_login: String,
}

/// Admin user listing.
#[derive(Debug, Serialize)]
pub struct AdminUsersResponse {
    /// Users (newest first).
    pub users: Vec<AdminUserResponse>,
    /// Total users.
    pub total: i64,
    /// Page size used.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
    /// Whether there are more users.
    pub has_more: bool,
}

/// List users with key counts and usage.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<AdminUsersResponse>, ApiError> {
    let limit = query.limit_or(DEFAULT_USERS_LIMIT)?;
    let rows = state.store.list_users(limit, query.offset).await?;
    let total = state.store.count_users().await?;

    let users: Vec<AdminUserResponse> = rows
        .into_iter()
        .map(|summary| AdminUserResponse {
            address: summary.user.address.to_string(),
            credits: summary.user.credits,
            total_spent_cents: summary.user.total_spent_cents,
            is_active: summary.user.is_active,
            key_count: summary.key_count,
            credits_used: summary.credits_used,
            created_at: summary.user.created_at.to_rfc3339(),
            last_login: summary.user.last_login.to_rfc3339(),
        })
        .collect();

    Ok(Json(AdminUsersResponse {
        has_more: has_more(query.offset, users.len(), total),
        users,
        total,
        limit,
        offset: query.offset,
    }))
}

/// One ledger row in the admin listing.
#[derive(Debug, Serialize)]
pub struct AdminTransactionResponse {
    /// Owner's wallet address.
    pub address: String,
    /// The row.
    #[serde(flatten)]
    pub transaction: TransactionResponse,
}

/// Admin ledger listing.
#[derive(Debug, Serialize)]
pub struct AdminTransactionsResponse {
    /// Rows across all users (newest first).
    pub transactions: Vec<AdminTransactionResponse>,
    /// Total rows.
    pub total: i64,
    /// Page size used.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
    /// Whether there are more rows.
    pub has_more: bool,
}

/// List every user's ledger rows.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<AdminTransactionsResponse>, ApiError> {
    let limit = query.limit_or(DEFAULT_TRANSACTIONS_LIMIT)?;
    let rows = state.store.list_all_transactions(limit, query.offset).await?;
    let total = state.store.count_all_transactions().await?;

    let transactions: Vec<AdminTransactionResponse> = rows
        .iter()
        .map(|entry| AdminTransactionResponse {
            address: entry.address.to_string(),
            transaction: TransactionResponse::from(&entry.transaction),
        })
        .collect();

    Ok(Json(AdminTransactionsResponse {
        has_more: has_more(query.offset, transactions.len(), total),
        transactions,
        total,
        limit,
        offset: query.offset,
    }))
}

fn has_more(offset: u32, shown: usize, total: i64) -> bool {
    i64::from(offset) + i64::try_from(shown).unwrap_or(i64::MAX) < total
}

/// Look up a user without creating one; admins never create users.
async fn existing_user(state: &AppState, address: &str) -> Result<User, ApiError> {
    let address = WalletAddress::parse(address)?;
    state
        .store
        .get_user_by_address(&address)
        .await?
        .ok_or_else(|| {
            LedgerError::UserNotFound {
                user_id: address.to_string(),
            }
            .into()
        })
}
