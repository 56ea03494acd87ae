use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

/// Connect options for the business dataset. The dataset is never written through
/// these options: connections are read-only and the file is not created on demand.
pub fn read_only_options(
    database_url: &str,
    timeout_secs: u64,
) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(Duration::from_secs(timeout_secs.max(1))))
}

/// On-disk file behind a sqlite URL, or `None` for in-memory databases.
pub fn database_file(database_url: &str) -> Option<PathBuf> {
    let url = database_url.trim();
    if url.contains(":memory:") || url.contains("mode=memory") {
        return None;
    }

    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Writable pool used by operator tooling (schema setup and demo seeding).
pub async fn connect_writable(database_url: &str, timeout_secs: u64) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(timeout_secs.max(1)));

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}
