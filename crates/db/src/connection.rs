use std::str::FromStr;
use std::time::Duration;

use helixbook_core::config::StorageConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_storage(storage: &StorageConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&storage.url, storage.max_connections, storage.timeout_secs).await
}

/// File-backed databases are created on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use helixbook_core::config::AppConfig;
    use sqlx::Row;

    use super::connect_storage;

    #[tokio::test]
    async fn storage_config_opens_a_usable_pool() {
        let mut config = AppConfig::default();
        config.storage.url = "sqlite::memory:".to_string();
        config.storage.max_connections = 1;

        let pool = connect_storage(&config.storage).await.expect("connect");
        let one = sqlx::query("SELECT 1 AS one")
            .fetch_one(&pool)
            .await
            .expect("select")
            .get::<i64, _>("one");

        assert_eq!(one, 1);
    }
}
