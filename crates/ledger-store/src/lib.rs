//! `SQLite` storage layer for the credit ledger.
//!
//! This crate provides persistent storage for users, ledger rows and API keys
//! using `SQLite` through `sqlx`, with the schema applied by embedded
//! migrations on open.
//!
//! # Tables
//!
//! - `users`: one row per wallet address, holding the balance
//! - `transactions`: append-only ledger, unique on `transaction_hash` and on
//!   `(user_id, idempotency_key)`
//! - `api_keys`: issued keys, stored as a SHA-256 digest and a masked form
//!
//! # Atomic units
//!
//! Balance changes go through [`SqliteStore::with_transaction`] with the
//! statement helpers in [`queries`]:
//!
//! ```no_run
//! use chrono::Utc;
//! use ledger_core::LedgerError;
//! use ledger_store::{queries, SqliteStore, StoreConfig};
//!
//! # async fn run() -> Result<(), LedgerError> {
//! let store = SqliteStore::open(&StoreConfig::for_path("/tmp/ledger.db")).await?;
//! let user = store
//!     .get_or_create_user("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
//!     .await?;
//! let user_id = user.id;
//!
//! let balance = store
//!     .with_transaction(move |conn| {
//!         Box::pin(async move {
//!             let balance = queries::credit_user(conn, &user_id, 100, 0, Utc::now()).await?;
//!             Ok::<_, LedgerError>(balance)
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod queries;
pub mod schema;
pub mod sqlite;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use sqlx::SqliteConnection;
