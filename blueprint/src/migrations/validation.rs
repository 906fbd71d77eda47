//! Migration folder checks

use super::file::{self, MigrationFile};
use super::MigrationDirection;
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::Path;

/// Statements that lose data when found in an up file
const DANGEROUS_PATTERNS: [(&str, &str); 4] = [
    ("DROP TABLE", "Dropping tables"),
    ("DROP DATABASE", "Dropping databases"),
    ("DELETE FROM", "Deleting data"),
    ("TRUNCATE", "Truncating tables"),
];

/// Migration validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid_count: usize,
    pub total_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Check every migration in `folder`
///
/// A migration counts as valid when both of its files exist and can be read.
/// Warnings never make a migration invalid.
pub fn validate(folder: impl AsRef<Path>, extension: &str) -> Result<ValidationReport> {
    let folder = folder.as_ref();
    let ups = file::scan(folder, extension, MigrationDirection::Up)?;
    let downs = file::scan(folder, extension, MigrationDirection::Down)?;

    let up_names: BTreeSet<&str> = ups.iter().map(|f| f.name.as_str()).collect();

    let mut report = ValidationReport {
        total_count: ups.len(),
        ..Default::default()
    };

    for down in downs.iter().filter(|d| !up_names.contains(d.name.as_str())) {
        report
            .errors
            .push(format!("Migration {} has a down file but no up file", down.name));
    }

    for up in &ups {
        if check_migration(up, &mut report)? {
            report.valid_count += 1;
        }
    }

    log::debug!(
        "Validated {} migration(s) in {}: {} error(s), {} warning(s)",
        report.total_count,
        folder.display(),
        report.errors.len(),
        report.warnings.len()
    );
    Ok(report)
}

fn check_migration(up: &MigrationFile, report: &mut ValidationReport) -> Result<bool> {
    let mut valid = true;

    if !file::has_timestamp_prefix(&up.name) {
        report.warnings.push(format!(
            "Migration {} does not start with a timestamp; it may run out of order",
            up.name
        ));
    }

    if !up.counterpart().exists() {
        report.errors.push(format!(
            "Migration {} has no down file - rollback will not be possible",
            up.name
        ));
        valid = false;
    }

    let sql = match up.read() {
        Ok(sql) => sql,
        Err(e) => {
            report
                .errors
                .push(format!("Migration {} could not be read: {}", up.name, e.root()));
            return Ok(false);
        }
    };

    if sql.trim().is_empty() {
        report
            .warnings
            .push(format!("Migration {} has an empty up file", up.name));
    }

    let upper = sql.to_uppercase();
    for (pattern, description) in DANGEROUS_PATTERNS {
        if upper.contains(pattern) {
            report.warnings.push(format!(
                "Migration {} contains {}: {}",
                up.name, description, pattern
            ));
        }
    }

    Ok(valid)
}
