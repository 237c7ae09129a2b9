//! PostgreSQL connection pooling.
//!
//! A `Connection` owns the `PgPool` of one named connection. Establishing it
//! retries with exponential backoff and verifies the pool with `SELECT 1`;
//! every failure comes back as `RelationalError::Connection`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::ConnectionConfig;
use crate::{RelationalError, Result};

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one (0 fails immediately).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before each retry, in order. Yields `max_retries` items.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(move |retry| {
            let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
            // Overflowing or negative delays saturate at the cap.
            Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
        })
    }
}

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    /// Acquire timeout in seconds.
    pub connect_timeout: u64,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub retry: RetryConfig,
    /// Prepared statements cached per connection (0 disables the cache).
    pub statement_cache_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connect_timeout: 30,
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            retry: RetryConfig::default(),
            statement_cache_capacity: 100,
        }
    }
}

impl PoolConfig {
    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout))
            .max_lifetime(self.max_lifetime)
            .idle_timeout(self.idle_timeout)
    }
}

/// Pooled connection to the database of one named connection.
#[derive(Clone)]
pub struct Connection {
    name: String,
    pool: PgPool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

impl Connection {
    /// Opens the pool described by `config`.
    ///
    /// # Errors
    ///
    /// `Connection` if the database is unreachable after all retries or
    /// rejects the connection.
    #[instrument(skip(config), fields(
        connection = %config.name,
        host = %config.host,
        port = config.port,
        max_connections = config.pool.max_connections,
        max_retries = config.pool.retry.max_retries
    ))]
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let pool = Self::connect_with_retry(config).await?;

        sqlx::query("SELECT 1").execute(&pool).await.map_err(|e| {
            RelationalError::Connection(format!(
                "connection \"{}\" failed verification: {}",
                config.name, e
            ))
        })?;

        info!("Connection pool ready");
        Ok(Self {
            name: config.name.clone(),
            pool,
        })
    }

    async fn connect_with_retry(config: &ConnectionConfig) -> Result<PgPool> {
        let connect_options = config.connect_options()?;
        let pool_options = config.pool.pool_options();
        let mut delays = config.pool.retry.delays();
        let mut attempt = 0u32;

        loop {
            let err = match pool_options.clone().connect_with(connect_options.clone()).await {
                Ok(pool) => {
                    if attempt > 0 {
                        info!(attempt, "Connected after retry");
                    }
                    return Ok(pool);
                }
                Err(err) => err,
            };

            let Some(delay) = delays.next() else {
                return Err(RelationalError::Connection(format!(
                    "could not connect to \"{}\" ({}): {}",
                    config.name,
                    config.redacted_dsn(),
                    err
                )));
            };
            attempt += 1;
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Connection failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Name of the connection this pool belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the connection pool.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!(connection = %self.name, "Connection pool closed");
        Ok(())
    }

    /// Pings the database to verify connectivity.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RelationalError::Connection(format!("ping failed: {}", e)))?;
        Ok(())
    }
}
