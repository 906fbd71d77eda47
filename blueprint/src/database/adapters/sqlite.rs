//! SQLite migration adapter implementation

use crate::config::SqliteInfo;
use crate::database::adapter::{validate_table_name, MigrationAdapter};
use crate::error::Result;
use crate::migrations::MigrationDirection;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::fs;
use std::sync::Arc;

/// SQLite migration adapter
///
/// Each step runs inside one transaction, so a failed record rolls the
/// change-set back with it.
#[derive(Clone)]
pub struct SqliteAdapter {
    table: String,
    extension: String,
    pool: Arc<SqlitePool>,
}

impl SqliteAdapter {
    /// Open the database described by the config, creating the file if needed
    pub async fn connect(info: &SqliteInfo) -> Result<Self> {
        let pool = if info.is_memory() {
            Self::memory_pool().await?
        } else {
            if let Some(parent) = info.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }

            let options = SqliteConnectOptions::new()
                .filename(&info.path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        log::debug!("Connected to SQLite database: {}", info.path.display());
        Self::from_pool(pool, &info.migration.table, &info.migration.extension)
    }

    /// Pool over a private in-memory database
    ///
    /// Every SQLite memory connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub async fn memory_pool() -> Result<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(pool)
    }

    /// Create adapter from existing pool
    pub fn from_pool(
        pool: SqlitePool,
        table: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        Ok(Self {
            table,
            extension: extension.into(),
            pool: Arc::new(pool),
        })
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_record(conn: &mut SqliteConnection, table: &str, name: &str) -> Result<()> {
        sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", table))
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete_record(conn: &mut SqliteConnection, table: &str, name: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE name = ?", table))
            .bind(name)
            .execute(&mut *conn)
            .await?;

        // Wind the AUTOINCREMENT counter back to the last surviving row
        let last_id: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} ORDER BY id DESC LIMIT 1",
            table
        ))
        .fetch_optional(&mut *conn)
        .await?;

        sqlx::query("UPDATE sqlite_sequence SET seq = ? WHERE name = ?")
            .bind(last_id.unwrap_or(0))
            .bind(table)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl MigrationAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    async fn table_exist(&self) -> Result<()> {
        sqlx::query(&format!("SELECT 1 FROM {} LIMIT 1", self.table))
            .fetch_optional(&*self.pool)
            .await?;
        Ok(())
    }

    async fn create_table(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(191) NOT NULL UNIQUE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            self.table
        ))
        .execute(&*self.pool)
        .await?;

        log::info!("Created migration table '{}'", self.table);
        Ok(())
    }

    async fn status(&self) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM {} ORDER BY id DESC LIMIT 1",
            self.table
        ))
        .fetch_optional(&*self.pool)
        .await?;
        Ok(name)
    }

    async fn migrate(&self, sql: &str) -> Result<()> {
        // Log SQL in development mode
        #[cfg(debug_assertions)]
        {
            log::debug!("SQLite MIGRATE: {}", sql);
        }

        sqlx::raw_sql(sql).execute(&*self.pool).await?;
        Ok(())
    }

    async fn record_up(&self, name: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_record(&mut conn, &self.table, name).await
    }

    async fn record_down(&self, name: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::delete_record(&mut conn, &self.table, name).await
    }

    async fn apply(&self, direction: MigrationDirection, name: &str, sql: &str) -> Result<()> {
        #[cfg(debug_assertions)]
        {
            log::debug!("SQLite APPLY {:?} {}: {}", direction, name, sql);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(sql)).await?;

        match direction {
            MigrationDirection::Up => Self::insert_record(&mut tx, &self.table, name).await?,
            MigrationDirection::Down => Self::delete_record(&mut tx, &self.table, name).await?,
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn adapter() -> SqliteAdapter {
        let pool = SqliteAdapter::memory_pool().await.unwrap();
        SqliteAdapter::from_pool(pool, "migration", "sql").unwrap()
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let adapter = adapter().await;

        assert!(adapter.table_exist().await.is_err());
        adapter.create_table().await.unwrap();
        adapter.table_exist().await.unwrap();
        assert_eq!(adapter.status().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_up_and_down_restore_counter() {
        let adapter = adapter().await;
        adapter.create_table().await.unwrap();

        adapter.record_up("first").await.unwrap();
        adapter.record_up("second").await.unwrap();
        assert_eq!(adapter.status().await.unwrap().as_deref(), Some("second"));

        adapter.record_down("second").await.unwrap();
        adapter.record_down("first").await.unwrap();
        assert_eq!(adapter.status().await.unwrap(), None);

        adapter.record_up("again").await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM migration WHERE name = 'again'")
            .fetch_one(adapter.pool())
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_failed_apply_rolls_back() {
        let adapter = adapter().await;
        adapter.create_table().await.unwrap();
        adapter.record_up("taken").await.unwrap();

        // The record violates the UNIQUE constraint, so the table must not survive
        let result = adapter
            .apply(
                MigrationDirection::Up,
                "taken",
                "CREATE TABLE rolled_back (id INTEGER);",
            )
            .await;
        assert!(result.is_err());

        let exists: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'rolled_back'",
        )
        .fetch_optional(adapter.pool())
        .await
        .unwrap();
        assert_eq!(exists, None);
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let pool = SqliteAdapter::memory_pool().await.unwrap();
        assert!(SqliteAdapter::from_pool(pool, "bad name", "sql").is_err());
    }
}
