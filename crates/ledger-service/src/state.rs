//! Application state.

use std::sync::Arc;
use std::time::Duration;

use ledger_core::{CommissionRate, PackageCatalog};
use ledger_store::SqliteStore;

use crate::config::ServiceConfig;
use crate::ledger::{CreditEngine, KeyGate, UsageMeter};
use crate::rate_limit::RateLimiter;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: SqliteStore,

    /// Purchases, usage debits and adjustments.
    pub engine: CreditEngine,

    /// API key issue, revoke and authentication.
    pub gate: KeyGate,

    /// Widget action billing.
    pub meter: UsageMeter,

    /// Per-client request limiter for `/v1`.
    pub rate_limiter: Arc<RateLimiter>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Wire the ledger components over `store`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if the configured commission
    /// rate is above 100%.
    pub fn new(store: SqliteStore, config: ServiceConfig) -> ledger_core::Result<Self> {
        let commission = CommissionRate::from_bps(config.commission_bps)?;
        let engine = CreditEngine::new(store.clone(), PackageCatalog::default(), commission);
        let gate = KeyGate::new(store.clone(), config.min_balance_credits);
        let meter = UsageMeter::new(engine.clone(), store.clone(), config.action_costs.clone());
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max,
            Duration::from_secs(config.rate_limit_window_secs),
        ));

        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - admin routes are disabled");
        }

        Ok(Self {
            store,
            engine,
            gate,
            meter,
            rate_limiter,
            config,
        })
    }
}
