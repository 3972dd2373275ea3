//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, credits, health, keys, reports, widget};
use crate::rate_limit;
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/credits/packages` - Credit package catalog
///
/// ## Credits (wallet bearer auth)
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/history` - Transaction history
/// - `GET /v1/credits/transactions/:hash` - One transaction by on-chain hash
/// - `POST /v1/credits/purchase` - Credit a confirmed purchase
/// - `GET /v1/credits/usage` - Usage by day and by key
///
/// ## Keys (wallet bearer auth)
/// - `POST /v1/keys` - Issue a key
/// - `GET /v1/keys` - List keys
/// - `DELETE /v1/keys/:id` - Revoke a key
///
/// ## Widget (API key auth)
/// - `GET /v1/widget/validate` - Check a key
/// - `POST /v1/widget/usage` - Bill an action
/// - `GET /v1/widget/stats` - Owner's recent usage and balance
///
/// ## Admin (admin key auth)
/// - `POST /v1/admin/adjust` - Manual credit correction
/// - `POST /v1/admin/users/:address/active` - Enable or disable a user
/// - `GET /v1/admin/stats` - Service-wide totals
/// - `GET /v1/admin/users` - Users with key counts and usage
/// - `GET /v1/admin/transactions` - Every user's ledger rows
///
/// Everything under `/v1` is rate limited per client IP.
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let max_concurrent_requests = state.config.max_concurrent_requests;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let v1 = Router::new()
        // Credits
        .route("/v1/credits/packages", get(credits::list_packages))
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/history", get(credits::history))
        .route(
            "/v1/credits/transactions/:hash",
            get(credits::get_transaction),
        )
        .route("/v1/credits/purchase", post(credits::purchase))
        .route("/v1/credits/usage", get(reports::usage_report))
        // Keys
        .route("/v1/keys", post(keys::create_key).get(keys::list_keys))
        .route("/v1/keys/:id", delete(keys::revoke_key))
        // Widget
        .route("/v1/widget/validate", get(widget::validate))
        .route("/v1/widget/usage", post(widget::record_usage))
        .route("/v1/widget/stats", get(reports::widget_stats))
        // Admin
        .route("/v1/admin/adjust", post(admin::adjust_credits))
        .route("/v1/admin/stats", get(admin::stats))
        .route("/v1/admin/users", get(admin::list_users))
        .route("/v1/admin/transactions", get(admin::list_transactions))
        .route(
            "/v1/admin/users/:address/active",
            post(admin::set_user_active),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::enforce,
        ));

    Router::new()
        // Health (public, not rate limited)
        .route("/health", get(health::health))
        .merge(v1)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
