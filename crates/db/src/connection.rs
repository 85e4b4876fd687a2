use std::str::FromStr;
use std::time::Duration;

use partsmart_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // Every connection to an in-memory database opens its own empty database.
    let max_connections = if is_in_memory(database_url) { 1 } else { max_connections.max(1) };
    let timeout = Duration::from_secs(timeout_secs.max(1));
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
}

pub fn is_in_memory(database_url: &str) -> bool {
    let url = database_url.trim();
    url == ":memory:" || url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory};

    #[test]
    fn detects_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:partsmart?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://partsmart.db"));
    }

    #[tokio::test]
    async fn in_memory_pool_is_pinned_to_one_connection() {
        let pool = connect_with_settings("sqlite::memory:", 8, 30).await.expect("connect");
        sqlx::query("CREATE TABLE shared (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO shared (id) VALUES (1)").execute(&pool).await.expect("insert");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shared")
            .fetch_one(&pool)
            .await
            .expect("table visible on every acquire");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_database_file_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fresh.db");
        let pool = connect_with_settings(&format!("sqlite://{}", path.display()), 2, 30)
            .await
            .expect("connect creates file");
        pool.close().await;
        assert!(path.exists());
    }
}
