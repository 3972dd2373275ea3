//! Widget handlers, authenticated by API key.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::ApiKeyAuth;
use crate::error::ApiError;
use crate::extract::Json as JsonBody;
use crate::ledger::UsageReceipt;
use crate::state::AppState;

/// Longest accepted `Idempotency-Key` header.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Key validation response.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// Always true; invalid keys get an error.
    pub valid: bool,
    /// Name of the key used.
    pub key_name: String,
    /// Owner's wallet address.
    pub address: String,
    /// Owner's balance.
    pub balance: i64,
}

/// Check an API key and report the owner's balance.
pub async fn validate(ApiKeyAuth(ctx): ApiKeyAuth) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        valid: true,
        key_name: ctx.key_name,
        address: ctx.user.address.to_string(),
        balance: ctx.balance,
    })
}

/// Usage request. The price always comes from the action table; key
/// holders cannot set it.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Billable action name.
    pub action: String,
}

/// Bill one widget action.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    ApiKeyAuth(ctx): ApiKeyAuth,
    headers: HeaderMap,
    JsonBody(body): JsonBody<UsageRequest>,
) -> Result<Json<UsageReceipt>, ApiError> {
    let idempotency_key = idempotency_key(&headers)?;

    let receipt = state
        .meter
        .meter(&ctx, &body.action, None, idempotency_key)
        .await?;

    Ok(Json(receipt))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get("idempotency-key") else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".into()))?
        .trim();
    if key.is_empty() {
        return Ok(None);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Idempotency-Key exceeds {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_string()))
}
