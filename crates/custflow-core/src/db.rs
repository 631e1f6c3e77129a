// crates/custflow-core/src/db.rs

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error::{PipelineError, Result};

pub type DbPool = Pool<Sqlite>;

/// Opens a SQLite connection pool for the warehouse, creating the database
/// file if it does not exist yet.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|err| {
            PipelineError::Config(format!("invalid warehouse URI '{database_url}': {err}"))
        })?
        .create_if_missing(true);

    let pool = if is_in_memory(database_url) {
        // Every connection to an in-memory database sees its own empty database,
        // so keep exactly one alive for the life of the pool.
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
    };

    pool.map_err(|err| PipelineError::storage("failed to connect to warehouse", err))
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
