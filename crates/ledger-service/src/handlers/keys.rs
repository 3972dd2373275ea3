//! API key management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledger_core::{ApiKey, ApiKeyId, LedgerError};

use crate::auth::WalletAuth;
use crate::error::ApiError;
use crate::extract::{Json as JsonBody, Path};
use crate::state::AppState;

/// Key issue request.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    /// Display name, 1 to 100 characters.
    pub name: String,
    /// Origin the key is meant for.
    pub domain: Option<String>,
}

/// A key as listed; never includes the token.
#[derive(Debug, Serialize)]
pub struct KeyResponse {
    /// Key id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Origin the key is meant for.
    pub domain: Option<String>,
    /// Masked token.
    pub key_masked: String,
    /// False once revoked.
    pub is_active: bool,
    /// Billed calls so far.
    pub usage_count: i64,
    /// Issue time.
    pub created_at: String,
    /// Last billed call.
    pub last_used: Option<String>,
}

impl From<&ApiKey> for KeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.to_string(),
            name: key.name.clone(),
            domain: key.domain.clone(),
            key_masked: key.key_masked.clone(),
            is_active: key.is_active,
            usage_count: key.usage_count,
            created_at: key.created_at.to_rfc3339(),
            last_used: key.last_used.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response to a successful issue. `key` is shown only here.
#[derive(Debug, Serialize)]
pub struct CreatedKeyResponse {
    /// The plaintext token.
    pub key: String,
    /// The stored record.
    #[serde(flatten)]
    pub record: KeyResponse,
}

/// Issue a new API key.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    JsonBody(body): JsonBody<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreatedKeyResponse>), ApiError> {
    let issued = state
        .gate
        .issue_key(auth.user.id, &body.name, body.domain.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedKeyResponse {
            record: KeyResponse::from(&issued.key),
            key: issued.plaintext,
        }),
    ))
}

/// Key list response.
#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    /// Keys, newest first, revoked ones included.
    pub keys: Vec<KeyResponse>,
}

/// List the caller's keys.
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let keys = state.gate.list_keys(auth.user.id).await?;
    Ok(Json(ListKeysResponse {
        keys: keys.iter().map(KeyResponse::from).collect(),
    }))
}

/// Revoke response.
#[derive(Debug, Serialize)]
pub struct RevokeKeyResponse {
    /// Revoked key id.
    pub id: String,
    /// Always true.
    pub revoked: bool,
}

/// Revoke one of the caller's keys.
pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    Path(key_id): Path<String>,
) -> Result<Json<RevokeKeyResponse>, ApiError> {
    // A malformed id cannot name one of the caller's keys.
    let key_id: ApiKeyId = key_id
        .parse()
        .map_err(|_| LedgerError::KeyNotFound {
            key_id: key_id.clone(),
        })?;

    state.gate.revoke_key(auth.user.id, key_id).await?;

    Ok(Json(RevokeKeyResponse {
        id: key_id.to_string(),
        revoked: true,
    }))
}
