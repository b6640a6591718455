//! PostgreSQL connection pool
//!
//! One pool is created per process at start and shared by every store:
//!
//! ```ignore
//! let pool = DatabasePool::from_config(&config.database).await?;
//! let replica = PostgresReplicaRepository::new(pool.store());
//! let comments = PostgresCommentRepository::new(pool.store());
//! ```

use std::time::Duration;

use agora_domain::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

use super::transaction::PgStore;

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections kept open
    pub min_connections: u32,
    /// Connection acquisition timeout
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Upper bound on every unit of work run through the pool's stores
    pub transaction_timeout: Option<Duration>,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            transaction_timeout: None,
        }
    }
}

impl DatabasePoolConfig {
    pub fn new(max_connections: u32, min_connections: u32, connection_timeout_secs: u64) -> Self {
        Self {
            max_connections,
            min_connections,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
            ..Self::default()
        }
    }

    pub fn with_transaction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transaction_timeout = timeout;
        self
    }
}

impl From<&DatabaseConfig> for DatabasePoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self::new(
            config.pool_size,
            config.min_idle,
            config.connect_timeout_secs,
        )
        .with_transaction_timeout(config.transaction_timeout_secs.map(Duration::from_secs))
    }
}

/// Process-wide PostgreSQL pool
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
    transaction_timeout: Option<Duration>,
}

impl DatabasePool {
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the database is unreachable.
    pub async fn new(url: &str, config: DatabasePoolConfig) -> Result<Self, PoolError> {
        info!(
            min = config.min_connections,
            max = config.max_connections,
            timeout = ?config.connection_timeout,
            "Creating PostgreSQL pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(url)
            .await
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

        info!("PostgreSQL pool created");

        Ok(Self {
            pool,
            transaction_timeout: config.transaction_timeout,
        })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, PoolError> {
        if config.url.trim().is_empty() {
            return Err(PoolError::MissingUrl);
        }
        Self::new(&config.url, DatabasePoolConfig::from(config)).await
    }

    #[inline]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[inline]
    pub fn pg_pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// A store running on this pool, not bound to any transaction.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone()).with_timeout(self.transaction_timeout)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Missing database URL")]
    MissingUrl,
}
