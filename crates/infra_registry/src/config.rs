//! Store configuration and connection pool management
//!
//! [`StoreConfig`] carries the PostgreSQL pool settings and the row lock
//! timeout applied to every transaction. It can be built in code or loaded
//! from `COOP_*` environment variables.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{RegistryError, StorageError};
use crate::store::PgStore;

/// Connection pool and locking settings for the PostgreSQL store
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use infra_registry::StoreConfig;
///
/// let config = StoreConfig::new("postgres://localhost/coop")
///     .max_connections(20)
///     .lock_timeout(Duration::from_millis(500));
/// assert_eq!(config.max_connections, 20);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection acquire timeout
    pub connect_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
    /// Idle timeout before closing a connection
    pub idle_timeout: Duration,
    /// Bound on row lock waits inside a transaction
    pub lock_timeout: Duration,
}

impl StoreConfig {
    /// Creates a configuration with the given connection URL and default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Loads configuration from `COOP_*` environment variables
    ///
    /// Recognised variables: `COOP_DATABASE_URL`, `COOP_MAX_CONNECTIONS`,
    /// `COOP_MIN_CONNECTIONS`, `COOP_CONNECT_TIMEOUT_SECS`,
    /// `COOP_MAX_LIFETIME_SECS`, `COOP_IDLE_TIMEOUT_SECS`,
    /// `COOP_LOCK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix("COOP"))
    }

    /// Loads configuration from any `config` source, applying defaults
    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        let settings: StoreSettings = config::Config::builder()
            .set_default("database_url", defaults.url.clone())?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("min_connections", i64::from(defaults.min_connections))?
            .set_default("connect_timeout_secs", defaults.connect_timeout.as_secs() as i64)?
            .set_default("max_lifetime_secs", defaults.max_lifetime.as_secs() as i64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout.as_secs() as i64)?
            .set_default("lock_timeout_ms", defaults.lock_timeout.as_millis() as i64)?
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Ok(settings.into())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("postgres://localhost/coop")
    }
}

#[derive(Debug, Deserialize)]
struct StoreSettings {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
    connect_timeout_secs: u64,
    max_lifetime_secs: u64,
    idle_timeout_secs: u64,
    lock_timeout_ms: u64,
}

impl From<StoreSettings> for StoreConfig {
    fn from(settings: StoreSettings) -> Self {
        StoreConfig::new(settings.database_url)
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .lock_timeout(Duration::from_millis(settings.lock_timeout_ms))
    }
}

/// Creates a PostgreSQL connection pool
///
/// # Errors
///
/// Returns a `Connection` storage error if the pool cannot be created
pub async fn create_pool(config: &StoreConfig) -> Result<PgPool, StorageError> {
    info!(
        "Creating database pool with max_connections={}, min_connections={}",
        config.max_connections, config.min_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| StorageError::connection(e.to_string()))?;

    info!("Database pool created successfully");
    Ok(pool)
}

/// Creates a pool and wraps it in a [`PgStore`] with the configured lock timeout
pub async fn connect_store(config: &StoreConfig) -> Result<PgStore, RegistryError> {
    let pool = create_pool(config)
        .await
        .map_err(|e| RegistryError::storage("connect", "store", "postgres", e))?;
    Ok(PgStore::new(pool).with_lock_timeout(config.lock_timeout))
}
