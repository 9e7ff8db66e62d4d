//! Database schema and migrations.
//!
//! The DDL lives in `migrations/` and is embedded at compile time.

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnection;

use crate::storage::StorageError;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Initialize the database schema.
///
/// Creates the measurements table and its indexes if they don't exist.
pub async fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    MIGRATOR.run(conn).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{DEFAULT_CONNECT_TIMEOUT, SqliteConnector, close_quietly};

    const MEASUREMENTS_TABLE: &str = "measurements";

    #[tokio::test]
    async fn test_schema_initialization() {
        let connector = SqliteConnector::new("sqlite::memory:", DEFAULT_CONNECT_TIMEOUT).unwrap();
        let mut conn = connector.connect().await.unwrap();
        init_schema(&mut conn).await.unwrap();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(MEASUREMENTS_TABLE)
        .fetch_one(&mut conn)
        .await
        .unwrap();
        assert_eq!(count.0, 1);

        let indexes: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name LIKE 'idx_%' ORDER BY name",
        )
        .bind(MEASUREMENTS_TABLE)
        .fetch_all(&mut conn)
        .await
        .unwrap();
        let names: Vec<_> = indexes.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            vec![
                "idx_measurements_aqi",
                "idx_measurements_city",
                "idx_measurements_datetime",
                "idx_measurements_station",
            ]
        );

        close_quietly(conn).await;
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let connector = SqliteConnector::new("sqlite::memory:", DEFAULT_CONNECT_TIMEOUT).unwrap();
        let mut conn = connector.connect().await.unwrap();

        init_schema(&mut conn).await.unwrap();
        init_schema(&mut conn).await.unwrap();

        close_quietly(conn).await;
    }
}
