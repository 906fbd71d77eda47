//! MySQL migration adapter implementation

use crate::config::MySqlInfo;
use crate::database::adapter::{validate_table_name, MigrationAdapter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{Connection, MySqlConnection, MySqlPool};
use std::sync::Arc;

/// MySQL migration adapter
///
/// MySQL commits DDL implicitly, so steps use the default `apply`: the
/// change-set and its marker row are two separate writes.
#[derive(Clone)]
pub struct MySqlAdapter {
    table: String,
    extension: String,
    pool: Arc<MySqlPool>,
}

impl MySqlAdapter {
    /// Connect to the configured database, creating it if it does not exist
    pub async fn connect(info: &MySqlInfo) -> Result<Self> {
        let info = info.with_defaults();
        let options = connect_options(&info, true)?;

        let pool = match MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!(
                    "Could not connect to MySQL database '{}' ({}), attempting to create it",
                    info.database,
                    e
                );

                // Connect to the server without selecting a database
                let mut conn = MySqlConnection::connect_with(&connect_options(&info, false)?)
                    .await
                    .map_err(|e| {
                        Error::from(e).with_context("Failed to connect to MySQL server")
                    })?;
                create_database(&mut conn, &info).await?;
                conn.close().await?;

                MySqlPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await?
            }
        };

        log::debug!(
            "Connected to MySQL database '{}' on {}:{}",
            info.database,
            info.hostname,
            info.port
        );
        Self::from_pool(pool, &info.migration.table, &info.migration.extension)
    }

    /// Create adapter from existing pool
    pub fn from_pool(
        pool: MySqlPool,
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
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Last migration id
    async fn status_id(&self) -> Result<Option<u32>> {
        let id: Option<u32> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} ORDER BY id DESC LIMIT 1",
            self.table
        ))
        .fetch_optional(&*self.pool)
        .await?;
        Ok(id)
    }
}

/// Build connection options from the config
///
/// `Parameter` accepts `key=value` pairs joined by `&`; only the keys the
/// driver understands are applied, the rest are logged and skipped.
pub fn connect_options(info: &MySqlInfo, include_database: bool) -> Result<MySqlConnectOptions> {
    let mut options = MySqlConnectOptions::new()
        .host(&info.hostname)
        .port(info.port)
        .username(&info.username)
        .charset(&info.charset)
        .collation(&info.collation);

    if !info.password.is_empty() {
        options = options.password(&info.password);
    }

    if include_database {
        options = options.database(&info.database);
    }

    for pair in info
        .parameter
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
    {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::config(format!("Invalid MySQL parameter: {}", pair)))?;

        match key {
            "charset" => options = options.charset(value),
            "collation" => options = options.collation(value),
            "timezone" | "time_zone" => options = options.timezone(Some(value.to_string())),
            _ => log::debug!("Ignoring MySQL parameter '{}'", key),
        }
    }

    Ok(options)
}

/// Marker table DDL
fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INT UNSIGNED NOT NULL AUTO_INCREMENT,
            name VARCHAR(191) NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY (name),
            PRIMARY KEY (id)
        )",
        table
    )
}

async fn create_database(conn: &mut MySqlConnection, info: &MySqlInfo) -> Result<()> {
    validate_table_name(&info.database)
        .map_err(|_| Error::config(format!("Invalid MySQL database name: {}", info.database)))?;

    sqlx::query(&format!(
        "CREATE DATABASE {} DEFAULT CHARSET = {} COLLATE = {}",
        info.database, info.charset, info.collation
    ))
    .execute(&mut *conn)
    .await?;

    log::info!("Created MySQL database '{}'", info.database);
    Ok(())
}

#[async_trait]
impl MigrationAdapter for MySqlAdapter {
    fn name(&self) -> &str {
        "MySQL"
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
        sqlx::query(&create_table_sql(&self.table))
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
            log::debug!("MySQL MIGRATE: {}", sql);
        }

        // Text protocol, so multi-statement bodies run as written
        sqlx::raw_sql(sql).execute(&*self.pool).await?;
        Ok(())
    }

    async fn record_up(&self, name: &str) -> Result<()> {
        sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", self.table))
            .bind(name)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn record_down(&self, name: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE name = ? LIMIT 1", self.table))
            .bind(name)
            .execute(&*self.pool)
            .await?;

        // Point AUTO_INCREMENT back at the last surviving row, or 1 when empty
        let next_id = self.status_id().await?.unwrap_or(1);

        sqlx::query(&format!(
            "ALTER TABLE {} AUTO_INCREMENT = {}",
            self.table, next_id
        ))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
