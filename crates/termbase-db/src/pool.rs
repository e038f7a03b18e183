//! PostgreSQL pool setup for the document store.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use termbase_core::config::DatabaseSettings;
use termbase_core::defaults;
use termbase_core::{Error, Result};

/// Limits applied to the document store's connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long an acquire may wait, including the initial connect.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections open indefinitely.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(defaults::DB_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    /// Limits from the `[termbase.database]` config table; the rest default.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            max_connections: settings.max_connections,
            acquire_timeout: Duration::from_secs(settings.connect_timeout_secs),
            ..Self::default()
        }
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Connected document store pool"
    );
    Ok(pool)
}

/// Point-in-time connection counts of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn exhausted(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Log the pool's connection counts, warning when none is idle.
pub fn log_pool_metrics(pool: &PgPool) -> PoolStats {
    let stats = PoolStats::of(pool);
    if stats.exhausted() {
        warn!(
            subsystem = "db",
            component = "pool",
            op = "metrics",
            pool_size = stats.size,
            "No idle connections in document store pool"
        );
    } else {
        debug!(
            subsystem = "db",
            component = "pool",
            op = "metrics",
            pool_size = stats.size,
            pool_idle = stats.idle,
            "Document store pool status"
        );
    }
    stats
}
