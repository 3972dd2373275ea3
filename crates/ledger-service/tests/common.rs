//! Common test utilities for ledger service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use ledger_core::{ActionCosts, User, DEFAULT_COMMISSION_BPS};
use ledger_service::{create_router, AppState, ServiceConfig};
use ledger_store::{SqliteStore, StoreConfig};

/// Admin key configured on every harness.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Shared state, for driving the ledger directly.
    pub state: AppState,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a harness with a custom configuration. The database URL is
    /// always replaced with a fresh temporary file.
    pub async fn with_config(config: ServiceConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store_config = StoreConfig::for_path(temp_dir.path().join("ledger.db"));
        let store = SqliteStore::open(&store_config)
            .await
            .expect("Failed to open store");

        let config = ServiceConfig {
            database_url: store_config.database_url,
            ..config
        };

        let state = AppState::new(store, config).expect("Failed to build state");
        let router: Router = create_router(state.clone());

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// The store behind the server.
    pub fn store(&self) -> &SqliteStore {
        &self.state.store
    }

    /// Bearer header for a wallet.
    pub fn wallet_header(address: &str) -> String {
        format!("Bearer {address}")
    }

    /// Create (or fetch) the user for `address`.
    pub async fn user(&self, address: &str) -> User {
        self.store()
            .get_or_create_user(address)
            .await
            .expect("Failed to create user")
    }

    /// Create a user holding `credits`, funded through an admin adjustment.
    pub async fn funded_user(&self, address: &str, credits: i64) -> User {
        let user = self.user(address).await;
        if credits > 0 {
            self.state
                .engine
                .apply_adjustment(user.id, credits, "Test funding".into())
                .await
                .expect("Failed to fund user");
        }
        self.store().get_user(&user.id).await.expect("Failed to reload user")
    }

    /// Issue an API key over HTTP and return its plaintext token.
    pub async fn issue_key(&self, address: &str, name: &str) -> String {
        let response = self
            .server
            .post("/v1/keys")
            .add_header("authorization", Self::wallet_header(address))
            .json(&json!({ "name": name }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["key"].as_str().expect("key in response").to_string()
    }
}

/// Configuration used by [`TestHarness::new`].
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        db_max_connections: 8,
        db_busy_timeout_ms: 5_000,
        db_tx_timeout_ms: 10_000,
        admin_api_key: Some(ADMIN_KEY.into()),
        commission_bps: DEFAULT_COMMISSION_BPS,
        min_balance_credits: 1,
        action_costs: ActionCosts::default(),
        rate_limit_max: 10_000,
        rate_limit_window_secs: 900,
        trust_forwarded_for: true,
        cors_origins: vec!["*".into()],
        max_body_bytes: 64 * 1024,
        request_timeout_seconds: 30,
        max_concurrent_requests: 512,
    }
}

/// A valid, distinct wallet address for `n`.
pub fn address(n: u32) -> String {
    format!("0x{n:040x}")
}
