use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DbConfig;
use crate::error::{EngineError, Result};

/// Open a pool for a connection string such as `sqlite:data/hr.sqlite`.
///
/// A bare path is accepted and treated as `sqlite:<path>`. The file must
/// already exist: the engine only reads schemas it did not create.
pub async fn connect(url: &str, config: &DbConfig) -> Result<SqlitePool> {
    let url = if url.starts_with("sqlite:") {
        url.to_string()
    } else {
        format!("sqlite:{}", url)
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| EngineError::Connection(format!("invalid connection string {url}: {e}")))?
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| EngineError::Connection(format!("{url}: {e}")))?;

    tracing::debug!(%url, "opened connection pool");
    Ok(pool)
}
