//! Connection settings for the `SQLite` store.

use std::path::Path;
use std::time::Duration;

/// How the store opens and guards its database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `SQLite` URL, e.g. `sqlite://data/ledger.db`.
    pub database_url: String,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Deadline for one atomic unit, from `BEGIN` to `COMMIT`.
    pub tx_timeout: Duration,
}

impl StoreConfig {
    /// Settings for a database file at `path`, otherwise defaults.
    #[must_use]
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/ledger.db".to_string(),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
            tx_timeout: Duration::from_secs(10),
        }
    }
}
