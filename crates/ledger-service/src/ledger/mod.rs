//! Ledger operations.
//!
//! - [`CreditEngine`] applies purchases, usage debits and admin adjustments,
//!   each as one atomic store unit.
//! - [`KeyGate`] issues, revokes and authenticates API keys.
//! - [`UsageMeter`] prices a widget action and bills it through the engine.

pub mod engine;
pub mod gate;
pub mod meter;

pub use engine::{AdjustmentReceipt, CreditEngine, PurchaseReceipt, UsageReceipt};
pub use gate::{ApiKeyContext, IssuedKey, KeyGate};
pub use meter::UsageMeter;
