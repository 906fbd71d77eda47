//! Database migration commands

use anyhow::{anyhow, Result};
use blueprint::error::ErrorChain;
use blueprint::{create_adapter, Driver, Migrator, StorageConfig};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct MigrateCommand {
    /// Storage backend: mysql, postgresql or sqlite (defaults to the first section in env.json)
    #[arg(long)]
    pub driver: Option<String>,

    #[command(subcommand)]
    pub action: MigrateAction,
}

#[derive(Debug, Subcommand)]
pub enum MigrateAction {
    /// Create a new up/down migration pair
    Make {
        /// Description, e.g. "create user table"
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },

    /// Apply the next migration
    Up,

    /// Remove the last applied migration
    Down,

    /// Show the last applied migration
    Status,

    /// Apply every migration not yet applied
    All,

    /// Remove every applied migration
    Reset,

    /// Remove every applied migration, then apply them all again
    Refresh,

    /// List migrations and whether they are applied
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Check the migration folder for unpaired or suspicious files
    Validate,
}

#[derive(Serialize)]
struct MigrationRow<'a> {
    name: &'a str,
    applied: bool,
    up: String,
    down: String,
}

impl MigrateCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config = StorageConfig::load(config_path.as_deref())?;

        let driver = match &self.driver {
            Some(name) => Driver::parse(name)?,
            None => config
                .default_driver()
                .ok_or_else(|| anyhow!("No MySQL, PostgreSQL or SQLite section found in config file."))?,
        };

        let settings = config.migration(driver)?.clone();
        let adapter = create_adapter(&config, driver).await?;
        let mut migrator = Migrator::new(adapter, settings.table, &settings.folder).await?;

        let result = match self.action {
            MigrateAction::Make { description } => migrator.create(&description.join(" ")),
            MigrateAction::Up => migrator.up_one().await,
            MigrateAction::Down => migrator.down_one().await,
            MigrateAction::All => migrator.up_all().await,
            MigrateAction::Reset => migrator.down_all().await,
            MigrateAction::Refresh => migrator.refresh().await,
            MigrateAction::Status => migrator.status().await.map(|status| println!("{}", status)),
            MigrateAction::List { format } => return list(&migrator, &format).await,
            MigrateAction::Validate => return validate(&migrator),
        };

        print!("{}", migrator.output());

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_noop() => {
                println!("{}", e);
                Ok(())
            }
            Err(e) => {
                log::error!("[{}] {}", e.error_code(), ErrorChain::new(&e).format_for_log());
                Err(e.into())
            }
        }
    }
}

async fn list(migrator: &Migrator, format: &str) -> Result<()> {
    let migrations = migrator.list().await?;

    match format {
        "json" => {
            let rows: Vec<_> = migrations
                .iter()
                .map(|m| MigrationRow {
                    name: &m.name,
                    applied: m.applied,
                    up: m.up_path.display().to_string(),
                    down: m.down_path.display().to_string(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        "table" => {
            if migrations.is_empty() {
                println!("No migration files in {}", migrator.folder().display());
            }
            for m in &migrations {
                let mark = if m.applied { "+" } else { " " };
                println!("{} | {}", mark, m.name);
            }
        }
        other => return Err(anyhow!("Unsupported format: {} (use table or json)", other)),
    }

    Ok(())
}

fn validate(migrator: &Migrator) -> Result<()> {
    let report = migrator.validate()?;

    if report.has_warnings() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("   {}", warning);
        }
    }

    if !report.is_valid() {
        println!("Errors ({}):", report.errors.len());
        for error in &report.errors {
            println!("   {}", error);
        }
        return Err(anyhow!(
            "Validation failed: {} of {} migration(s) valid",
            report.valid_count,
            report.total_count
        ));
    }

    println!(
        "Validation passed: {} migration(s), {} warning(s)",
        report.total_count,
        report.warnings.len()
    );
    Ok(())
}
