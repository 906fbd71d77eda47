//! PostgreSQL migration adapter implementation

use crate::config::PostgresInfo;
use crate::database::adapter::{validate_table_name, MigrationAdapter};
use crate::error::{Error, Result};
use crate::migrations::MigrationDirection;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;

/// PostgreSQL migration adapter
///
/// PostgreSQL DDL is transactional, so each step and its marker row commit
/// together.
#[derive(Clone)]
pub struct PostgresAdapter {
    table: String,
    extension: String,
    pool: Arc<PgPool>,
}

impl PostgresAdapter {
    /// Connect to the configured database
    pub async fn connect(info: &PostgresInfo) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options(info)?)
            .await
            .map_err(|e| Error::from(e).with_context("Failed to connect to PostgreSQL"))?;

        log::debug!(
            "Connected to PostgreSQL database '{}' on {}:{}",
            info.database,
            info.hostname,
            info.port
        );
        Self::from_pool(pool, &info.migration.table, &info.migration.extension)
    }

    /// Create adapter from existing pool
    pub fn from_pool(
        pool: PgPool,
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
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_record(conn: &mut PgConnection, table: &str, name: &str) -> Result<()> {
        sqlx::query(&format!("INSERT INTO {} (name) VALUES ($1)", table))
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete_record(conn: &mut PgConnection, table: &str, name: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE name = $1", table))
            .bind(name)
            .execute(&mut *conn)
            .await?;

        let last_id: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} ORDER BY id DESC LIMIT 1",
            table
        ))
        .fetch_optional(&mut *conn)
        .await?;

        // An empty table restarts the sequence at 1; otherwise continue after the last row
        let (value, is_called) = match last_id {
            Some(id) => (i64::from(id), true),
            None => (1, false),
        };

        sqlx::query("SELECT setval(pg_get_serial_sequence($1, 'id'), $2, $3)")
            .bind(table)
            .bind(value)
            .bind(is_called)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

/// Build connection options from the config
///
/// `Parameter` accepts `key=value` pairs joined by `&`, as in a libpq URL.
pub fn connect_options(info: &PostgresInfo) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::new()
        .host(&info.hostname)
        .port(info.port)
        .username(&info.username)
        .database(&info.database);

    if !info.password.is_empty() {
        options = options.password(&info.password);
    }

    for pair in info
        .parameter
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
    {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::config(format!("Invalid PostgreSQL parameter: {}", pair)))?;

        match key {
            "application_name" => options = options.application_name(value),
            "search_path" => options = options.options([("search_path", value)]),
            _ => log::debug!("Ignoring PostgreSQL parameter '{}'", key),
        }
    }

    Ok(options)
}

#[async_trait]
impl MigrationAdapter for PostgresAdapter {
    fn name(&self) -> &str {
        "PostgreSQL"
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
                id SERIAL PRIMARY KEY,
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
            log::debug!("PostgreSQL MIGRATE: {}", sql);
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
