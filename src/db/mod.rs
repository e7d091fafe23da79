//! PostgreSQL connection provider and the generic query layer.
//!
//! - [`query_cache`] - logical-key statement shape cache
//! - [`predicate`] - WHERE-clause expression tree
//! - [`executor`] - select/count/insert/update/upsert/increment primitives

pub mod error;
pub mod executor;
pub mod predicate;
pub mod query_cache;
pub mod value;

pub use error::DbError;
pub use executor::{Assignment, Executor, RowCursor};
pub use predicate::Predicate;
pub use query_cache::{CacheStats, PreparedStatement, QueryCache};
pub use value::Value;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;

use crate::config::{ConfigError, PgConfig};

/// PostgreSQL database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new connection pool from resolved configuration.
    ///
    /// A connection whose operation was abandoned mid-flight (dropped future)
    /// is closed by sqlx instead of being returned to the pool.
    pub async fn connect(config: &PgConfig) -> Result<Self, ConfigError> {
        let options = config.connect_options()?;
        tracing::info!(endpoint = %config.describe(), "Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(ConfigError::Connect)?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
