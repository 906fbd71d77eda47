use thiserror::Error;

pub mod context;

pub type Result<T> = std::result::Result<T, Error>;

// Re-export context helpers
pub use context::{ErrorChain, ErrorContext, OptionExt};

/// Main error type for Blueprint
#[derive(Error, Debug)]
pub enum Error {
    #[error("No migrations yet.")]
    NoMigrations,

    #[error("Database current. No changes made.")]
    DatabaseCurrent,

    #[error("Could not create the migration table.")]
    TableNotCreated,

    /// The marker table references a migration whose file is gone.
    #[error("Migration is missing on disk: {0}")]
    MissingOnDisk(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn missing_on_disk(name: impl Into<String>) -> Self {
        Self::MissingOnDisk(name.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any context layers
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the error only reports that there was nothing to do
    ///
    /// Callers such as deployment scripts print these and carry on.
    pub fn is_noop(&self) -> bool {
        matches!(self.root(), Error::NoMigrations | Error::DatabaseCurrent)
    }

    /// Check if the database and the migration folder disagree
    pub fn is_drift(&self) -> bool {
        matches!(self.root(), Error::MissingOnDisk(_))
    }

    /// Get a stable error code for logs and exit reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoMigrations => "E_NO_MIGRATIONS",
            Error::DatabaseCurrent => "E_DB_CURRENT",
            Error::TableNotCreated => "E_TABLE_NOT_CREATED",
            Error::MissingOnDisk(_) => "E_MISSING_ON_DISK",
            Error::Config(_) => "E_CONFIG",
            Error::InvalidInput(_) => "E_INVALID_INPUT",
            Error::Database(_) => "E_DATABASE",
            Error::Io(_) => "E_IO",
            Error::Json(_) => "E_JSON",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_errors() {
        assert!(Error::NoMigrations.is_noop());
        assert!(Error::DatabaseCurrent.is_noop());
        assert!(!Error::TableNotCreated.is_noop());
        assert!(Error::DatabaseCurrent
            .with_context("running all migrations")
            .is_noop());
    }

    #[test]
    fn test_messages_match_operator_output() {
        assert_eq!(Error::NoMigrations.to_string(), "No migrations yet.");
        assert_eq!(
            Error::DatabaseCurrent.to_string(),
            "Database current. No changes made."
        );
        assert_eq!(
            Error::missing_on_disk("20160101_000000.000000_create_user").to_string(),
            "Migration is missing on disk: 20160101_000000.000000_create_user"
        );
    }

    #[test]
    fn test_drift_classification() {
        assert!(Error::missing_on_disk("a").is_drift());
        assert!(Error::missing_on_disk("a").with_context("status").is_drift());
        assert!(!Error::config("bad").is_drift());
        assert_eq!(Error::missing_on_disk("a").error_code(), "E_MISSING_ON_DISK");
    }

    #[test]
    fn test_context_keeps_code() {
        let err = Error::TableNotCreated.with_context("opening migrator");
        assert_eq!(err.error_code(), "E_TABLE_NOT_CREATED");
        assert_eq!(err.to_string(), "opening migrator");
    }
}
