//! Blueprint - forward and backward SQL migrations
//!
//! Blueprint keeps a folder of timestamped up/down SQL files in step with a
//! marker table in the database:
//! - MySQL, PostgreSQL and SQLite adapters over `sqlx`
//! - One step or every step, in either direction
//! - JSON configuration shared with the rest of the starter kit

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod config;
pub mod database;
pub mod error;
pub mod migrations;

// Re-export main types for public API
pub use config::{Driver, MigrationSettings, StorageConfig};
pub use database::{create_adapter, MigrationAdapter, MySqlAdapter, PostgresAdapter, SqliteAdapter};
pub use error::{Error, Result};
pub use migrations::{MigrationDirection, MigrationFile, MigrationInfo, Migrator, ValidationReport};
