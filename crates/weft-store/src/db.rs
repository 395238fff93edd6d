//! Connection pool management.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use weft_config::DatabaseSection;

use crate::error::StoreResult;

/// The relational store. Cheap to clone; all clones share the pool.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Connect a bounded pool per the configuration.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::Database`] if the pool cannot be established.
    pub async fn connect(config: &DatabaseSection) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs.max(1)))
            .connect(&config.url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "connected to execution store"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared pools).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers needing raw queries.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
