//! Store health checks and schema bootstrap.

use etl_core::error::DbErrorCode;
use etl_core::{Error, Result};
use tracing::{debug, error};

use crate::client::Store;

/// Check database connection health.
pub async fn check_connection(store: &Store) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(store.pool()).await {
        Ok(_) => {
            debug!("Database connection healthy");
            true
        }
        Err(e) => {
            error!("Database health check failed: {}", e);
            false
        }
    }
}

/// Create tables and indexes that do not exist yet.
pub async fn init_schema(store: &Store) -> Result<()> {
    use crate::schema::all_statements;

    for ddl in all_statements() {
        sqlx::query(ddl).execute(store.pool()).await.map_err(|e| {
            Error::database(DbErrorCode::SchemaFailed, format!("Failed to execute DDL: {}", e))
        })?;
    }

    debug!("Database schema initialized");
    Ok(())
}
