//! Connection pool wrapper.

use std::str::FromStr;
use std::time::Duration;

use etl_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::StoreConfig;
use crate::health::init_schema;

/// Handle to the analytics database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    config: StoreConfig,
}

impl Store {
    /// Opens the database and creates missing tables.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                Error::invalid_parameter(format!("invalid database url '{}': {}", config.url, e))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        // An in-memory database lives and dies with its connection, so the
        // pool holds exactly one and never recycles it.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::store(format!("failed to open {}: {}", config.url, e)))?;

        let store = Self { pool, config };
        init_schema(&store).await?;

        info!(
            url = %store.config.url,
            max_connections = store.config.max_connections,
            "Opened analytics store"
        );

        Ok(store)
    }

    /// Fresh private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(StoreConfig::default().with_url("sqlite::memory:")).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Maps a sqlx failure to a coded store error naming the operation.
pub(crate) fn store_err(op: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::store(format!("{op}: {e}"))
}
