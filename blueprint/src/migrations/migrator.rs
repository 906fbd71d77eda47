//! Forward and backward migration runner
//!
//! The migrator keeps the sorted list of up files found in the migration
//! folder and asks the adapter for the last recorded migration whenever it
//! needs to know how far the database has been migrated. The position is
//! never cached, so it cannot drift from the marker table.

use super::file::{self, MigrationFile};
use super::validation::{self, ValidationReport};
use super::MigrationDirection;
use crate::database::MigrationAdapter;
use crate::error::{Error, ErrorContext, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Migration and whether it is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
    pub applied: bool,
}

/// Runs migrations from one folder against one marker table
///
/// Not safe to share between concurrent callers: two migrators working on the
/// same table must be serialized by the caller.
pub struct Migrator {
    adapter: Box<dyn MigrationAdapter>,
    table: String,
    folder: PathBuf,
    list: Vec<MigrationFile>,
    /// Body written to new up files by `create`
    pub template_up: String,
    /// Body written to new down files by `create`
    pub template_down: String,
    output: String,
}

impl Migrator {
    /// Create a migrator, creating the marker table if it does not exist
    ///
    /// # Arguments
    /// * `adapter` - Backend the migrations run against
    /// * `table` - Name of the marker table, for logs
    /// * `folder` - Folder holding the migration files
    ///
    /// # Returns
    /// * `Err(Error::TableNotCreated)` - The table was missing and could not be created
    pub async fn new(
        adapter: Box<dyn MigrationAdapter>,
        table: impl Into<String>,
        folder: impl AsRef<Path>,
    ) -> Result<Self> {
        let table = table.into();

        if let Err(e) = adapter.table_exist().await {
            log::debug!("Migration table '{}' not found: {}", table, e);
            if let Err(e) = adapter.create_table().await {
                log::error!("Could not create migration table '{}': {}", table, e);
                return Err(Error::TableNotCreated);
            }
        }

        let mut migrator = Self {
            adapter,
            table,
            folder: folder.as_ref().to_path_buf(),
            list: Vec::new(),
            template_up: String::new(),
            template_down: String::new(),
            output: String::new(),
        };
        migrator.update_list()?;

        log::debug!(
            "{} migrator ready: {} migration(s) in {}",
            migrator.adapter.name(),
            migrator.list.len(),
            migrator.folder.display()
        );
        Ok(migrator)
    }

    /// Create a migrator from a concrete adapter
    pub async fn with_adapter<A>(
        adapter: A,
        table: impl Into<String>,
        folder: impl AsRef<Path>,
    ) -> Result<Self>
    where
        A: MigrationAdapter + 'static,
    {
        Self::new(Box::new(adapter), table, folder).await
    }

    /// Set the bodies `create` writes into new files
    pub fn set_templates(&mut self, up: impl Into<String>, down: impl Into<String>) {
        self.template_up = up.into();
        self.template_down = down.into();
    }

    pub fn adapter(&self) -> &dyn MigrationAdapter {
        self.adapter.as_ref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Up files in application order
    pub fn migrations(&self) -> &[MigrationFile] {
        &self.list
    }

    /// Text log of the operations performed by this migrator
    pub fn output(&self) -> &str {
        &self.output
    }

    fn log(&mut self, text: impl AsRef<str>) {
        self.output.push_str(text.as_ref());
    }

    fn update_list(&mut self) -> Result<()> {
        self.list = file::scan(
            &self.folder,
            self.adapter.extension(),
            MigrationDirection::Up,
        )?;
        Ok(())
    }

    /// Index in the list of the migration with this name, counted from 1
    fn index_of(&self, name: &str) -> Result<usize> {
        self.list
            .iter()
            .position(|f| f.name == name)
            .map(|i| i + 1)
            .ok_or_else(|| {
                log::warn!(
                    "Migration '{}' is recorded in '{}' but not found in {}",
                    name,
                    self.table,
                    self.folder.display()
                );
                Error::missing_on_disk(name)
            })
    }

    /// Number of applied migrations; 0 means none
    ///
    /// Read from the marker table on every call.
    pub async fn position(&self) -> Result<usize> {
        match self.adapter.status().await? {
            Some(name) => self.index_of(&name),
            None => Ok(0),
        }
    }

    /// Name of the last applied migration
    ///
    /// Returns the "no migrations" message when nothing is applied, and
    /// `Error::MissingOnDisk` when the recorded migration has no file.
    pub async fn status(&self) -> Result<String> {
        let position = self.position().await?;
        if position == 0 {
            return Ok(Error::NoMigrations.to_string());
        }

        let current = &self.list[position - 1];
        if !current.exists() {
            return Err(Error::missing_on_disk(&current.name));
        }

        Ok(current.name.clone())
    }

    /// Every migration with its applied flag
    pub async fn list(&self) -> Result<Vec<MigrationInfo>> {
        let position = self.position().await?;

        Ok(self
            .list
            .iter()
            .enumerate()
            .map(|(i, up)| MigrationInfo {
                name: up.name.clone(),
                up_path: up.path.clone(),
                down_path: up.counterpart().path,
                applied: i < position,
            })
            .collect())
    }

    /// Check the folder for unpaired or suspicious files
    pub fn validate(&self) -> Result<ValidationReport> {
        validation::validate(&self.folder, self.adapter.extension())
    }

    /// Write a new up/down pair from the templates
    ///
    /// The up file is written first; if writing the down file fails the up
    /// file stays on disk.
    pub fn create(&mut self, description: &str) -> Result<()> {
        let description = file::normalize_description(description)?;
        let prefix = format!("{}_{}", file::timestamp(&Local::now()), description);
        let extension = self.adapter.extension().to_string();

        fs::create_dir_all(&self.folder).with_context(|| {
            format!(
                "Failed to create migrations directory {}",
                self.folder.display()
            )
        })?;

        let up = MigrationFile::new(&self.folder, &prefix, MigrationDirection::Up, &extension);
        let down = up.counterpart();

        if up.path.exists() || down.path.exists() {
            return Err(Error::invalid_input(format!(
                "Migration already exists: {}",
                prefix
            )));
        }

        for (file, body) in [(&up, &self.template_up), (&down, &self.template_down)] {
            fs::write(&file.path, body).with_context(|| {
                format!("Failed to write migration file {}", file.path.display())
            })?;
        }

        log::info!("Created migration {}", prefix);
        self.log(format!("Migration created: {}\n", up.path.display()));
        self.log(format!("Migration created: {}\n", down.path.display()));

        self.update_list()
    }

    /// Apply only the next migration
    pub async fn up_one(&mut self) -> Result<()> {
        if self.position().await? >= self.list.len() {
            return Err(Error::DatabaseCurrent);
        }

        self.up().await?;

        self.log("  | Migration up complete\n");
        Ok(())
    }

    /// Apply every migration that has not been applied
    ///
    /// Stops at the first failure; migrations applied before it stay applied.
    pub async fn up_all(&mut self) -> Result<()> {
        let position = self.position().await?;
        if position >= self.list.len() {
            return Err(Error::DatabaseCurrent);
        }

        for _ in position..self.list.len() {
            self.up().await?;
        }

        self.log("  | Migration up complete\n");
        Ok(())
    }

    /// Remove only the last applied migration
    pub async fn down_one(&mut self) -> Result<()> {
        if self.position().await? == 0 {
            return Err(Error::NoMigrations);
        }

        self.down().await?;

        self.log("  | Migration down complete\n");
        Ok(())
    }

    /// Remove every applied migration, newest first
    ///
    /// Stops at the first failure; migrations removed before it stay removed.
    pub async fn down_all(&mut self) -> Result<()> {
        let position = self.position().await?;
        if position == 0 {
            return Err(Error::NoMigrations);
        }

        for _ in 0..position {
            self.down().await?;
        }

        self.log("  | Migration down complete\n");
        Ok(())
    }

    /// Remove every applied migration, then apply them all again
    pub async fn refresh(&mut self) -> Result<()> {
        match self.down_all().await {
            Err(e) if !e.is_noop() => return Err(e),
            _ => {}
        }
        self.up_all().await
    }

    async fn up(&mut self) -> Result<()> {
        let position = self.position().await?;
        let file = self
            .list
            .get(position)
            .cloned()
            .ok_or(Error::DatabaseCurrent)?;

        let sql = file.read()?;

        self.adapter
            .apply(MigrationDirection::Up, &file.name, &sql)
            .await?;

        log::info!("Applied migration {}", file.name);
        self.log(format!("+ | Applied: {}\n", file.name));
        Ok(())
    }

    async fn down(&mut self) -> Result<()> {
        // Looked up by the recorded name, so only the last recorded migration is rolled back
        let recorded = self.adapter.status().await?.ok_or(Error::NoMigrations)?;
        let position = self.index_of(&recorded)?;
        let file = self.list[position - 1].counterpart();

        if !file.exists() {
            log::warn!("Down file {} is missing", file.path.display());
            return Err(Error::missing_on_disk(file.path.display().to_string()));
        }

        let sql = file.read()?;

        self.adapter
            .apply(MigrationDirection::Down, &file.name, &sql)
            .await?;

        log::info!("Removed migration {}", file.name);
        self.log(format!("- | Removed: {}\n", file.name));
        Ok(())
    }
}
