//! Migration adapter trait
//!
//! The migrator never talks to a database directly. Everything it needs from
//! storage goes through this narrow capability interface, with one
//! implementation per backend.

use crate::error::Result;
use crate::migrations::MigrationDirection;
use async_trait::async_trait;

/// Storage capabilities consumed by the migrator
///
/// Implementations own the marker table: its schema, the rows recorded for
/// applied migrations, and any auto-increment bookkeeping around them.
#[async_trait]
pub trait MigrationAdapter: Send + Sync {
    /// Get the backend name for logs
    fn name(&self) -> &str;

    /// File extension of migration files, without a leading period
    ///
    /// Must stay the same for the lifetime of a migrator.
    fn extension(&self) -> &str;

    /// Check that the marker table exists
    ///
    /// # Returns
    /// * `Ok(())` - The table exists and can be queried
    /// * `Err(Error)` - For any reason at all; the migrator then tries `create_table`
    async fn table_exist(&self) -> Result<()>;

    /// Create the marker table
    async fn create_table(&self) -> Result<()>;

    /// Name of the most recently recorded migration
    ///
    /// # Returns
    /// * `Ok(Some(name))` - The last recorded migration
    /// * `Ok(None)` - The marker table is empty
    /// * `Err(Error)` - If the query fails
    async fn status(&self) -> Result<Option<String>>;

    /// Run a change-set verbatim
    ///
    /// Bodies may hold several statements; they are not parsed or split.
    async fn migrate(&self, sql: &str) -> Result<()>;

    /// Record a migration as applied
    async fn record_up(&self, name: &str) -> Result<()>;

    /// Remove the record of an applied migration
    ///
    /// Must also reset any id counter so the next `record_up` reuses the id
    /// of the removed row.
    async fn record_down(&self, name: &str) -> Result<()>;

    /// Run a change-set and record the result
    ///
    /// The default runs `migrate` followed by `record_up`/`record_down`. If the
    /// record fails after a successful `migrate`, the schema has moved but the
    /// marker table has not, and the error is returned for manual repair.
    /// Backends with transactional DDL override this to do both in one
    /// transaction.
    async fn apply(&self, direction: MigrationDirection, name: &str, sql: &str) -> Result<()> {
        self.migrate(sql).await?;
        match direction {
            MigrationDirection::Up => self.record_up(name).await,
            MigrationDirection::Down => self.record_down(name).await,
        }
    }
}

/// Check a marker table name before it is spliced into SQL
///
/// Table names cannot be bound as parameters, so only plain identifiers are
/// accepted.
pub fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.len() <= 64
        && table
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(crate::error::Error::invalid_input(format!(
            "Invalid migration table name: {}",
            table
        )))
    }
}
