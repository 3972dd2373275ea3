//! Service configuration.

use std::str::FromStr;
use std::time::Duration;

use ledger_core::{ActionCosts, DEFAULT_COMMISSION_BPS};
use ledger_store::StoreConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// `SQLite` URL (default: "sqlite://data/ledger.db").
    pub database_url: String,

    /// Pooled database connections (default: 8).
    pub db_max_connections: u32,

    /// How long a statement waits on a locked database, in milliseconds.
    pub db_busy_timeout_ms: u64,

    /// Deadline for one atomic ledger unit, in milliseconds.
    pub db_tx_timeout_ms: u64,

    /// Key required in `X-Admin-Key` for admin routes. Admin routes are
    /// closed when unset.
    pub admin_api_key: Option<String>,

    /// Purchase commission in basis points (default: 200 = 2%).
    pub commission_bps: u32,

    /// Balance an API key's owner must hold to authenticate (default: 1).
    pub min_balance_credits: i64,

    /// Credits charged per widget action.
    pub action_costs: ActionCosts,

    /// Requests allowed per client IP per window (default: 100).
    pub rate_limit_max: u32,

    /// Rate limit window in seconds (default: 900).
    pub rate_limit_window_secs: u64,

    /// Take the client IP from `X-Forwarded-For` (only behind a proxy).
    pub trust_forwarded_for: bool,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Requests served at once before new ones wait.
    pub max_concurrent_requests: usize,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let action_costs = match std::env::var("ACTION_COSTS") {
            Ok(raw) => ActionCosts::parse(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid ACTION_COSTS, using defaults");
                defaults.action_costs.clone()
            }),
            Err(_) => defaults.action_costs.clone(),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            db_busy_timeout_ms: env_parse("DB_BUSY_TIMEOUT_MS", defaults.db_busy_timeout_ms),
            db_tx_timeout_ms: env_parse("DB_TX_TIMEOUT_MS", defaults.db_tx_timeout_ms),
            admin_api_key: std::env::var("ADMIN_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            commission_bps: env_parse("COMMISSION_BPS", defaults.commission_bps),
            min_balance_credits: env_parse("MIN_BALANCE_CREDITS", defaults.min_balance_credits),
            action_costs,
            rate_limit_max: env_parse("RATE_LIMIT_MAX", defaults.rate_limit_max),
            rate_limit_window_secs: env_parse(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            trust_forwarded_for: env_parse("TRUST_FORWARDED_FOR", defaults.trust_forwarded_for),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            max_concurrent_requests: env_parse(
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            ),
        }
    }

    /// Store settings derived from this configuration.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            max_connections: self.db_max_connections,
            busy_timeout: Duration::from_millis(self.db_busy_timeout_ms),
            tx_timeout: Duration::from_millis(self.db_tx_timeout_ms),
        }
    }
}

/// Parse an environment variable, keeping `default` when unset or invalid.
fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = %name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "sqlite://data/ledger.db".into(),
            db_max_connections: 8,
            db_busy_timeout_ms: 5_000,
            db_tx_timeout_ms: 10_000,
            admin_api_key: None,
            commission_bps: DEFAULT_COMMISSION_BPS,
            min_balance_credits: 1,
            action_costs: ActionCosts::default(),
            rate_limit_max: 100,
            rate_limit_window_secs: 15 * 60,
            trust_forwarded_for: false,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            max_concurrent_requests: 512,
        }
    }
}
