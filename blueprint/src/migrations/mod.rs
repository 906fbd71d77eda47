//! Database migration system for Blueprint
//!
//! This module provides a migration system with:
//! - Timestamped up/down migration file pairs
//! - A marker table recording what has been applied
//! - Stepping forwards and backwards, one at a time or all at once
//! - Folder validation for operators

pub mod file;
pub mod migrator;
pub mod validation;

pub use file::MigrationFile;
pub use migrator::{MigrationInfo, Migrator};
pub use validation::ValidationReport;

/// Migration direction (up or down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationDirection {
    Up,
    Down,
}

impl MigrationDirection {
    /// Name used in file suffixes
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            MigrationDirection::Up => MigrationDirection::Down,
            MigrationDirection::Down => MigrationDirection::Up,
        }
    }
}
