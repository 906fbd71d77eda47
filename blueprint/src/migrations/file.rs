//! Migration files on disk
//!
//! A migration is a pair of files sharing one name:
//! `<timestamp>_<description>.up.<ext>` and `<timestamp>_<description>.down.<ext>`.
//! The fixed-width timestamp makes lexicographic order chronological.

use super::MigrationDirection;
use crate::error::{Error, ErrorContext, Result};
use chrono::{DateTime, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};

/// Timestamp prefix format, e.g. `20060102_150405.000000`
pub const DATE_FORMAT: &str = "%Y%m%d_%H%M%S%.6f";

/// Width of a formatted timestamp prefix
pub const TIMESTAMP_LEN: usize = 22;

/// Longest accepted description
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// One direction of a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Base name shared by the up and down files
    pub name: String,
    pub direction: MigrationDirection,
    /// Extension without the leading period
    pub extension: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Build the file for `name` in `folder`
    pub fn new(
        folder: impl AsRef<Path>,
        name: impl Into<String>,
        direction: MigrationDirection,
        extension: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let extension = extension.into();
        let path = folder
            .as_ref()
            .join(format!("{}{}", name, suffix(direction, &extension)));

        Self {
            name,
            direction,
            extension,
            path,
        }
    }

    /// Recognise a migration file by its suffix
    ///
    /// Returns `None` for files that are not migrations of this extension.
    pub fn from_path(path: impl AsRef<Path>, extension: &str) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;

        [MigrationDirection::Up, MigrationDirection::Down]
            .into_iter()
            .find_map(|direction| {
                let name = file_name.strip_suffix(&suffix(direction, extension))?;
                if name.is_empty() {
                    return None;
                }
                Some(Self {
                    name: name.to_string(),
                    direction,
                    extension: extension.to_string(),
                    path: path.to_path_buf(),
                })
            })
    }

    /// The file for the opposite direction, in the same folder
    pub fn counterpart(&self) -> Self {
        let folder = self.path.parent().unwrap_or_else(|| Path::new(""));
        Self::new(
            folder,
            self.name.clone(),
            self.direction.reverse(),
            self.extension.clone(),
        )
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the change-set body
    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read migration file {}", self.path.display()))
    }
}

/// File suffix for a direction, e.g. `.up.sql`
pub fn suffix(direction: MigrationDirection, extension: &str) -> String {
    if extension.is_empty() {
        format!(".{}", direction.as_str())
    } else {
        format!(".{}.{}", direction.as_str(), extension)
    }
}

/// List the migration files of one direction, sorted by name
///
/// A folder that does not exist yet holds no migrations.
pub fn scan(
    folder: impl AsRef<Path>,
    extension: &str,
    direction: MigrationDirection,
) -> Result<Vec<MigrationFile>> {
    let folder = folder.as_ref();
    if !folder.exists() {
        log::debug!("Migration folder {} does not exist yet", folder.display());
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(folder).with_context(|| {
        format!("Failed to read migrations directory {}", folder.display())
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(file) = MigrationFile::from_path(&path, extension) {
            if file.direction == direction {
                files.push(file);
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));

    log::debug!(
        "Found {} {} migration(s) in {}",
        files.len(),
        direction.as_str(),
        folder.display()
    );
    Ok(files)
}

/// Turn a free-form description into the file name part
///
/// Lowercases and replaces spaces with underscores.
pub fn normalize_description(description: &str) -> Result<String> {
    let description = description.trim();

    if description.is_empty() {
        return Err(Error::invalid_input("Migration description cannot be empty"));
    }

    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(Error::invalid_input(format!(
            "Migration description too long (max {} characters)",
            MAX_DESCRIPTION_LEN
        )));
    }

    if !description
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ' || c == '-')
    {
        return Err(Error::invalid_input(
            "Migration description can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }

    Ok(description.replace(' ', "_").to_lowercase())
}

/// Format a timestamp prefix
pub fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(DATE_FORMAT).to_string()
}

/// Check that a name starts with a `YYYYMMDD_HHMMSS.ffffff_` prefix
pub fn has_timestamp_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() <= TIMESTAMP_LEN {
        return false;
    }

    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    digits(0..8)
        && bytes[8] == b'_'
        && digits(9..15)
        && bytes[15] == b'.'
        && digits(16..22)
        && bytes[22] == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        let stamp = timestamp(&at);
        assert_eq!(stamp, "20060102_150405.000000");
        assert_eq!(stamp.len(), TIMESTAMP_LEN);
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("Create user table").unwrap(),
            "create_user_table"
        );
        assert_eq!(normalize_description("  add-Index ").unwrap(), "add-index");
        assert!(normalize_description("").is_err());
        assert!(normalize_description("drop; table").is_err());
        assert!(normalize_description(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_from_path() {
        let up = MigrationFile::from_path(
            "/db/20160101_000000.000000_create_note.up.sql",
            "sql",
        )
        .unwrap();
        assert_eq!(up.name, "20160101_000000.000000_create_note");
        assert_eq!(up.direction, MigrationDirection::Up);

        let down = up.counterpart();
        assert_eq!(down.direction, MigrationDirection::Down);
        assert_eq!(
            down.path,
            Path::new("/db/20160101_000000.000000_create_note.down.sql")
        );

        assert!(MigrationFile::from_path("/db/readme.md", "sql").is_none());
        assert!(MigrationFile::from_path("/db/.up.sql", "sql").is_none());
    }

    #[test]
    fn test_empty_extension() {
        let file = MigrationFile::new("/db", "20160101_000000.000000_a", MigrationDirection::Up, "");
        assert_eq!(file.path, Path::new("/db/20160101_000000.000000_a.up"));
        assert_eq!(MigrationFile::from_path(&file.path, ""), Some(file));
    }

    #[test]
    fn test_scan_sorts_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in [
            "20160102_000000.000000_second.up.sql",
            "20160101_000000.000000_first.up.sql",
            "20160101_000000.000000_first.down.sql",
            "20160102_000000.000000_second.down.sql",
            "notes.txt",
            "20160103_000000.000000_other.up.psql",
        ] {
            fs::write(dir.join(name), "").unwrap();
        }

        let ups = scan(dir, "sql", MigrationDirection::Up).unwrap();
        let names: Vec<_> = ups.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "20160101_000000.000000_first",
                "20160102_000000.000000_second"
            ]
        );

        let downs = scan(dir, "sql", MigrationDirection::Down).unwrap();
        assert_eq!(downs.len(), 2);
    }

    #[test]
    fn test_scan_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let files = scan(temp_dir.path().join("nope"), "sql", MigrationDirection::Up).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_has_timestamp_prefix() {
        assert!(has_timestamp_prefix("20060102_150405.000000_create_user"));
        assert!(!has_timestamp_prefix("20060102_150405_create_user"));
        assert!(!has_timestamp_prefix("20060102_150405.000000"));
        assert!(!has_timestamp_prefix("create_user"));
    }
}
