//! API error types and responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use ledger_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid wallet or admin credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - malformed body, query, or path.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Too many requests from one client.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the client's window resets.
        retry_after_secs: u64,
    },

    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            Self::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs })),
            ),
            Self::Ledger(err) => ledger_parts(err),
        }
    }
}

fn ledger_parts(err: &LedgerError) -> (StatusCode, &'static str, Option<serde_json::Value>) {
    match err {
        LedgerError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_address", None),
        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount", None),
        LedgerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input", None),
        LedgerError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id", None),
        LedgerError::UnknownAction(_) => (StatusCode::BAD_REQUEST, "unknown_action", None),
        LedgerError::UnknownPackage(_) => (StatusCode::BAD_REQUEST, "unknown_package", None),
        LedgerError::MissingKey => (StatusCode::UNAUTHORIZED, "missing_api_key", None),
        LedgerError::InvalidKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),
        LedgerError::InsufficientCredits { balance, required } => (
            StatusCode::PAYMENT_REQUIRED,
            "insufficient_credits",
            Some(serde_json::json!({
                "balance": balance,
                "required": required
            })),
        ),
        LedgerError::UserNotFound { .. } => (StatusCode::NOT_FOUND, "user_not_found", None),
        LedgerError::KeyNotFound { .. } => (StatusCode::NOT_FOUND, "key_not_found", None),
        LedgerError::DuplicateTransaction { .. } => {
            (StatusCode::CONFLICT, "duplicate_transaction", None)
        }
        LedgerError::StoreUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();

        let message = if let Self::Ledger(LedgerError::StoreUnavailable(msg)) = &self {
            tracing::error!(error = %msg, "Store unavailable");
            "The ledger is temporarily unavailable".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_secs.into());
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
