//! Database backends for the migrator
//!
//! This module provides the capability interface the migrator consumes and one
//! adapter per supported backend, plus a factory that picks the adapter from
//! the storage configuration.

pub mod adapter;
pub mod adapters;

// Re-export main types for convenience
pub use adapter::{validate_table_name, MigrationAdapter};
pub use adapters::{MySqlAdapter, PostgresAdapter, SqliteAdapter};

use crate::config::{Driver, StorageConfig};
use crate::error::{OptionExt, Result};

/// Create a migration adapter for the chosen backend
///
/// The config is validated for that backend before any connection is made.
pub async fn create_adapter(
    config: &StorageConfig,
    driver: Driver,
) -> Result<Box<dyn MigrationAdapter>> {
    config.validate(driver)?;

    log::info!("Opening {} migration adapter", driver);

    match driver {
        Driver::MySql => {
            let info = config.mysql.as_ref().context("MySQL section is missing")?;
            Ok(Box::new(MySqlAdapter::connect(info).await?))
        }
        Driver::PostgreSql => {
            let info = config
                .postgresql
                .as_ref()
                .context("PostgreSQL section is missing")?;
            Ok(Box::new(PostgresAdapter::connect(info).await?))
        }
        Driver::Sqlite => {
            let info = config.sqlite.as_ref().context("SQLite section is missing")?;
            Ok(Box::new(SqliteAdapter::connect(info).await?))
        }
    }
}
