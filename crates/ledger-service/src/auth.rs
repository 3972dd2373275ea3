//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `WalletAuth` - end users, identified by `Authorization: Bearer <address>`
//! - `ApiKeyAuth` - widget integrations, via the `X-API-Key` header
//! - `AdminAuth` - privileged endpoints, via the `X-Admin-Key` header

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use ledger_core::User;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::ledger::ApiKeyContext;
use crate::state::AppState;

/// A user authenticated by wallet address.
///
/// The user is created on first sight; every request refreshes `last_login`.
#[derive(Debug, Clone)]
pub struct WalletAuth {
    /// The resolved user.
    pub user: User,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for WalletAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let address = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer wallet address".into()))?;

        let user = state.store.get_or_create_user(address).await?;
        Ok(Self { user })
    }
}

/// A request authenticated by API key.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth(pub ApiKeyContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_key = parts.headers.get("x-api-key").and_then(|v| v.to_str().ok());
        let ctx = state.gate.authenticate(raw_key).await?;
        Ok(Self(ctx))
    }
}

/// Admin authentication.
///
/// Requires the `X-Admin-Key` header to match the configured admin key.
/// With no key configured, every admin request is refused.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || ApiError::Unauthorized("invalid admin key".into());

        let admin_key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_deref()
            .ok_or_else(unauthorized)?;

        if !constant_time_eq(admin_key, expected_key) {
            tracing::warn!("Rejected admin request with wrong key");
            return Err(unauthorized());
        }

        let admin_id = parts
            .headers
            .get("x-admin-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("admin")
            .to_string();

        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(Self { admin_id })
    }
}
