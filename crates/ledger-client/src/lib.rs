//! Credit ledger client SDK.
//!
//! This crate lets widget backends talk to the ledger service with an API key.
//!
//! # Example
//!
//! ```no_run
//! use ledger_client::LedgerClient;
//!
//! # async fn example() -> Result<(), ledger_client::ClientError> {
//! let client = LedgerClient::new("http://ledger:8080", "sk_your_widget_key")?;
//!
//! // Check the key before rendering the widget
//! let key = client.validate_key().await?;
//! println!("{} has {} credits", key.address, key.balance);
//!
//! // Bill one action, safe to retry with the same idempotency key
//! let receipt = client.record_usage("generate", Some("req-123")).await?;
//! println!("New balance: {} credits", receipt.balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, LedgerClient};
pub use error::ClientError;
pub use types::*;
