use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::AppError;

pub type DbPool = SqlitePool;

/// Opens the trip document store, creating the database file on first boot.
/// WAL keeps readers unblocked while a whole trip document is rewritten;
/// the pool size comes from configuration since every write holds a
/// connection for a full read-modify-write.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_pool_creates_a_missing_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.sqlite");
        let url = format!("sqlite://{}", path.to_string_lossy());

        let pool = init_pool(&url, 2).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }
}
