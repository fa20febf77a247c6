//! Configuration for provisioners and transaction isolators
//!
//! Values come from the process environment (optionally seeded from `.env`
//! files) and can be overridden with [`EphemeralConfigBuilder`].
//!
//! # Environment Variables
//!
//! - `TEST_DATABASE_URL` - Connection string of the server to provision on
//! - `EPHEMERAL_CLEANUP_TIMEOUT_SECS` - Bound on post-test cleanup (default: 15)
//! - `EPHEMERAL_LOCK_TIMEOUT_SECS` - Bound on waiting for the template lock (default: 120)
//! - `EPHEMERAL_CONNECT_TIMEOUT_SECS` - Connection establishment timeout (default: 10)
//! - `EPHEMERAL_MAX_CONNECTIONS` - Pool size of each ephemeral database (default: 5)
//! - `EPHEMERAL_SQL_LOGGING` - Log every statement through sqlx (default: false)
//! - `EPHEMERAL_ISOLATION` - `read_committed`, `repeatable_read` or `serializable`
//!
//! # Example
//!
//! ```rust,no_run
//! use ephemeral_pg::EphemeralConfig;
//! use std::time::Duration;
//!
//! let config = EphemeralConfig::builder()
//!     .cleanup_timeout(Duration::from_secs(30))
//!     .build();
//! ```

pub mod env;

pub use env::{env, env_optional, load_dotenv};

use crate::isolator::Isolation;
use std::time::Duration;

/// Default bound on post-test cleanup operations
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on waiting for the template lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings shared by [`Provisioner`](crate::Provisioner) and
/// [`TxIsolator`](crate::TxIsolator)
#[derive(Debug, Clone)]
pub struct EphemeralConfig {
    /// Connection string used by the `from_env` constructors
    pub database_url: Option<String>,
    /// Bound on closing, dropping and rolling back after a test
    pub cleanup_timeout: Duration,
    /// Bound on waiting for another initializer to finish the template
    pub lock_timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Pool size of each ephemeral database
    pub max_connections: u32,
    /// Forward statements to sqlx logging
    pub sql_logging: bool,
    /// Isolation level of transactions opened by the isolator
    pub isolation: Isolation,
}

impl EphemeralConfig {
    /// Build config from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: env_optional("TEST_DATABASE_URL"),
            cleanup_timeout: Duration::from_secs(env(
                "EPHEMERAL_CLEANUP_TIMEOUT_SECS",
                DEFAULT_CLEANUP_TIMEOUT.as_secs(),
            )),
            lock_timeout: Duration::from_secs(env(
                "EPHEMERAL_LOCK_TIMEOUT_SECS",
                DEFAULT_LOCK_TIMEOUT.as_secs(),
            )),
            connect_timeout: Duration::from_secs(env("EPHEMERAL_CONNECT_TIMEOUT_SECS", 10u64)),
            max_connections: env("EPHEMERAL_MAX_CONNECTIONS", 5u32),
            sql_logging: env("EPHEMERAL_SQL_LOGGING", false),
            isolation: env("EPHEMERAL_ISOLATION", Isolation::default()),
        }
    }

    /// Create a builder for customizing config
    pub fn builder() -> EphemeralConfigBuilder {
        EphemeralConfigBuilder::default()
    }
}

impl Default for EphemeralConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Builder for EphemeralConfig
///
/// Anything left unset falls back to [`EphemeralConfig::from_env`].
#[derive(Debug, Default)]
pub struct EphemeralConfigBuilder {
    database_url: Option<String>,
    cleanup_timeout: Option<Duration>,
    lock_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    max_connections: Option<u32>,
    sql_logging: Option<bool>,
    isolation: Option<Isolation>,
}

impl EphemeralConfigBuilder {
    /// Set the connection string
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the bound on post-test cleanup operations
    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    /// Set the bound on waiting for the template lock
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Set the connection establishment timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the pool size of each ephemeral database
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Enable or disable sqlx statement logging
    pub fn sql_logging(mut self, enabled: bool) -> Self {
        self.sql_logging = Some(enabled);
        self
    }

    /// Set the isolation level used by the transaction isolator
    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Build the EphemeralConfig
    pub fn build(self) -> EphemeralConfig {
        let default = EphemeralConfig::from_env();
        EphemeralConfig {
            database_url: self.database_url.or(default.database_url),
            cleanup_timeout: self.cleanup_timeout.unwrap_or(default.cleanup_timeout),
            lock_timeout: self.lock_timeout.unwrap_or(default.lock_timeout),
            connect_timeout: self.connect_timeout.unwrap_or(default.connect_timeout),
            max_connections: self.max_connections.unwrap_or(default.max_connections).max(1),
            sql_logging: self.sql_logging.unwrap_or(default.sql_logging),
            isolation: self.isolation.unwrap_or(default.isolation),
        }
    }
}
