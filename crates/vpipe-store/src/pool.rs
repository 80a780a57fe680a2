//! Connection pool setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Pool};
use std::time::Duration;
use tracing::info;

use crate::error::{StoreError, StoreResult};

pub type DbPool = Pool<Postgres>;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// Connection acquire timeout
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Create config from environment variables.
    ///
    /// `DATABASE_URL` is required; everything else has defaults.
    pub fn from_env() -> StoreResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Config("DATABASE_URL not set".to_string()))?;

        Ok(Self {
            database_url,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            acquire_timeout: Duration::from_secs(
                std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }
}

/// Connect to PostgreSQL and build the pool.
pub async fn connect(config: &StoreConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}
