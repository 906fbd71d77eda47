//! Storage configuration loaded from the application's `env.json`
//!
//! Only the storage sections are read; every other key in the file belongs to
//! the web application and is ignored here. Keys keep the PascalCase spelling
//! used by the rest of the Blueprint config file.

use crate::error::{Error, OptionExt, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the path to `env.json`
pub const CONFIG_ENV_VAR: &str = "JAYCONFIG";

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    MySql,
    PostgreSql,
    Sqlite,
}

impl Driver {
    /// Get driver from string
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Driver::MySql),
            "postgresql" | "postgres" | "pg" => Ok(Driver::PostgreSql),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(Error::config(format!("Unsupported driver: {}", other))),
        }
    }

    /// Section name used in the config file
    pub fn section(&self) -> &'static str {
        match self {
            Driver::MySql => "MySQL",
            Driver::PostgreSql => "PostgreSQL",
            Driver::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Migration settings shared by every backend section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MigrationSettings {
    /// Marker table name
    ///
    /// Required: left empty when the key (or the whole `Migration` section)
    /// is missing, and rejected by `StorageConfig::validate`.
    #[serde(default)]
    pub table: String,

    /// Folder holding the `.up.<ext>` / `.down.<ext>` pairs
    #[serde(default = "default_migration_folder")]
    pub folder: PathBuf,

    /// Migration file extension without the leading period
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            table: String::new(),
            folder: default_migration_folder(),
            extension: default_extension(),
        }
    }
}

/// Connection details for a MySQL server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MySqlInfo {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    pub database: String,

    #[serde(default)]
    pub charset: String,

    #[serde(default)]
    pub collation: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Extra driver parameters, `key=value` pairs joined by `&`
    #[serde(default)]
    pub parameter: String,

    #[serde(default)]
    pub migration: MigrationSettings,
}

impl MySqlInfo {
    /// Fill in the charset and collation if they are not set
    pub fn with_defaults(&self) -> Self {
        let mut info = self.clone();
        if info.charset.is_empty() {
            info.charset = "utf8".to_string();
        }
        if info.collation.is_empty() {
            info.collation = "utf8_unicode_ci".to_string();
        }
        info
    }
}

/// Connection details for a PostgreSQL server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PostgresInfo {
    #[serde(default = "default_pg_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    pub database: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default)]
    pub parameter: String,

    #[serde(default)]
    pub migration: MigrationSettings,
}

/// Location of a SQLite database file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SqliteInfo {
    /// Database file, or `:memory:`
    pub path: PathBuf,

    #[serde(default)]
    pub migration: MigrationSettings,
}

impl SqliteInfo {
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Storage sections of `env.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "MySQL", default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<MySqlInfo>,

    #[serde(rename = "PostgreSQL", default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<PostgresInfo>,

    #[serde(rename = "SQLite", default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteInfo>,
}

impl StorageConfig {
    /// Load configuration from an explicit path, falling back to `JAYCONFIG`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Load configuration from the file named by `JAYCONFIG`
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONFIG_ENV_VAR).map_err(|_| {
            Error::config(format!(
                "Environment variable {} needs to be set to the env.json file location.",
                CONFIG_ENV_VAR
            ))
        })?;
        Self::from_file(path)
    }

    /// Load configuration from a JSON file
    ///
    /// Relative migration folders and SQLite paths resolve against the
    /// directory that contains the config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}. Make sure the file exists and is readable.",
                path_ref.display(),
                e
            ))
        })?;

        let mut config = Self::from_json(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check JSON syntax.",
                path_ref.display(),
                e
            ))
        })?;

        let base_dir = path_ref
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);

        log::debug!(
            "Successfully loaded storage configuration from: {}",
            path_ref.display()
        );
        Ok(config)
    }

    /// Parse configuration from a JSON string without resolving paths
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Make relative folders absolute against `base_dir`
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(mysql) = self.mysql.as_mut() {
            resolve(&mut mysql.migration.folder, base_dir);
        }
        if let Some(pg) = self.postgresql.as_mut() {
            resolve(&mut pg.migration.folder, base_dir);
        }
        if let Some(sqlite) = self.sqlite.as_mut() {
            resolve(&mut sqlite.migration.folder, base_dir);
            if !sqlite.is_memory() {
                resolve(&mut sqlite.path, base_dir);
            }
        }
    }

    /// First configured backend, in MySQL, PostgreSQL, SQLite order
    pub fn default_driver(&self) -> Option<Driver> {
        if self.mysql.is_some() {
            Some(Driver::MySql)
        } else if self.postgresql.is_some() {
            Some(Driver::PostgreSql)
        } else if self.sqlite.is_some() {
            Some(Driver::Sqlite)
        } else {
            None
        }
    }

    /// Migration settings for a backend
    pub fn migration(&self, driver: Driver) -> Result<&MigrationSettings> {
        let settings = match driver {
            Driver::MySql => self.mysql.as_ref().map(|i| &i.migration),
            Driver::PostgreSql => self.postgresql.as_ref().map(|i| &i.migration),
            Driver::Sqlite => self.sqlite.as_ref().map(|i| &i.migration),
        };
        settings.with_context(|| format!("{} section is missing in config file.", driver))
    }

    /// Validate the settings the migrator needs for a backend
    pub fn validate(&self, driver: Driver) -> Result<()> {
        let settings = self.migration(driver)?;

        if settings.table.trim().is_empty() {
            return Err(Error::config(format!(
                "{}.Migration.Table key is missing in config file.",
                driver
            )));
        }

        if settings.extension.starts_with('.') {
            return Err(Error::config(format!(
                "{}.Migration.Extension must not start with a period.",
                driver
            )));
        }

        if settings.folder.as_os_str().is_empty() {
            return Err(Error::config(format!(
                "{}.Migration.Folder key is missing in config file.",
                driver
            )));
        }

        Ok(())
    }
}

fn resolve(path: &mut PathBuf, base_dir: &Path) {
    if path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

// Default values for configuration
fn default_migration_folder() -> PathBuf {
    PathBuf::from("database/migration")
}
fn default_extension() -> String {
    "sql".to_string()
}
fn default_username() -> String {
    "root".to_string()
}
fn default_pg_username() -> String {
    "postgres".to_string()
}
fn default_hostname() -> String {
    "127.0.0.1".to_string()
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_pg_port() -> u16 {
    5432
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "Asset": { "Folder": "asset" },
        "MySQL": {
            "Username": "root",
            "Password": "secret",
            "Database": "blueprint",
            "Hostname": "127.0.0.1",
            "Port": 3306,
            "Parameter": "parseTime=true",
            "Migration": {
                "Table": "migration",
                "Folder": "database/migration",
                "Extension": "sql"
            }
        },
        "SQLite": {
            "Path": "database/blueprint.db",
            "Migration": { "Table": "migration", "Folder": "database/sqlite" }
        }
    }"#;

    #[test]
    fn test_parse_ignores_unrelated_sections() {
        let config = StorageConfig::from_json(SAMPLE).unwrap();

        let mysql = config.mysql.as_ref().unwrap();
        assert_eq!(mysql.username, "root");
        assert_eq!(mysql.password, "secret");
        assert_eq!(mysql.port, 3306);
        assert_eq!(mysql.migration.table, "migration");
        assert!(config.postgresql.is_none());
        assert_eq!(config.default_driver(), Some(Driver::MySql));
    }

    #[test]
    fn test_mysql_defaults() {
        let config = StorageConfig::from_json(SAMPLE).unwrap();
        let info = config.mysql.unwrap().with_defaults();
        assert_eq!(info.charset, "utf8");
        assert_eq!(info.collation, "utf8_unicode_ci");
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("env.json");
        fs::write(&config_path, SAMPLE).unwrap();

        let config = StorageConfig::from_file(&config_path).unwrap();

        let sqlite = config.sqlite.unwrap();
        assert_eq!(sqlite.path, temp_dir.path().join("database/blueprint.db"));
        assert_eq!(
            sqlite.migration.folder,
            temp_dir.path().join("database/sqlite")
        );
        assert_eq!(sqlite.migration.extension, "sql");
    }

    #[test]
    fn test_memory_sqlite_path_is_kept() {
        let mut config = StorageConfig::from_json(
            r#"{ "SQLite": { "Path": ":memory:", "Migration": { "Table": "migration" } } }"#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/srv/app"));

        let sqlite = config.sqlite.unwrap();
        assert!(sqlite.is_memory());
        assert_eq!(
            sqlite.migration.folder,
            Path::new("/srv/app/database/migration")
        );
    }

    #[test]
    fn test_validate_requires_table() {
        let config = StorageConfig::from_json(
            r#"{ "MySQL": { "Database": "blueprint", "Migration": { "Table": "" } } }"#,
        )
        .unwrap();

        let err = config.validate(Driver::MySql).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: MySQL.Migration.Table key is missing in config file."
        );
    }

    #[test]
    fn test_table_required_with_or_without_migration_section() {
        let config = StorageConfig::from_json(
            r#"{
                "MySQL": { "Database": "blueprint" },
                "SQLite": { "Path": "app.db", "Migration": { "Folder": "x" } }
            }"#,
        )
        .unwrap();

        for driver in [Driver::MySql, Driver::Sqlite] {
            let err = config.validate(driver).unwrap_err();
            assert!(err
                .to_string()
                .ends_with(&format!("{}.Migration.Table key is missing in config file.", driver)));
        }

        let sqlite = config.sqlite.unwrap();
        assert_eq!(sqlite.migration.extension, "sql");
        assert_eq!(sqlite.migration.folder, Path::new("x"));
    }

    #[test]
    fn test_missing_section() {
        let config = StorageConfig::from_json(SAMPLE).unwrap();
        let err = config.migration(Driver::PostgreSql).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_driver_parse() {
        assert_eq!(Driver::parse("MySQL").unwrap(), Driver::MySql);
        assert_eq!(Driver::parse("postgres").unwrap(), Driver::PostgreSql);
        assert_eq!(Driver::parse("sqlite").unwrap(), Driver::Sqlite);
        assert!(Driver::parse("oracle").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = StorageConfig::from_file("/nonexistent/env.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
