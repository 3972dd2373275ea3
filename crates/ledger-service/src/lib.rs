//! Credit ledger HTTP API service.
//!
//! This crate serves the credit ledger over HTTP:
//!
//! - Credit packages, balances, history and purchases
//! - API key issue and revocation
//! - Widget key validation and usage metering
//! - Admin credit adjustments
//!
//! # Authentication
//!
//! Three callers are recognised:
//!
//! 1. **Wallet bearer** - `Authorization: Bearer <address>` for dashboard routes
//! 2. **API keys** - `X-API-Key` for embedded widgets
//! 3. **Admin key** - `X-Admin-Key` for operator corrections

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Some handlers never await but must be async

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ledger;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
