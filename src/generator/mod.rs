//! Migration generation: version allocation and templates.
//!
//! Version allocation scans existing migration artifacts for the highest
//! 3-digit prefix and returns max+1 (gaps preserved). The migrations
//! directory is held under an OS-level exclusive lock between the scan and
//! the template write so two concurrent generators cannot collide on the
//! same version.

pub mod external;

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::ConfitureError;
use crate::migrate::{find_duplicate_versions, find_name_conflicts};

/// Any versioned artifact: `NNN_anything`
static VERSION_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3})_").unwrap());

static SNAKE_CASE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

const LOCK_FILE_NAME: &str = ".confiture.lock";

/// Outcome of a generation run.
#[derive(Debug, Serialize)]
pub struct GenerateResult {
    pub version: String,
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
    pub dry_run: bool,
    /// version → conflicting file names (soft warning)
    pub duplicate_versions: BTreeMap<String, Vec<String>>,
    /// name → versions sharing it (soft warning)
    pub name_conflicts: BTreeMap<String, Vec<String>>,
    /// Rendered up template (populated in dry-run mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// Generates migration file pairs with locked version allocation.
pub struct MigrationGenerator {
    migrations_dir: PathBuf,
}

impl MigrationGenerator {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Next free version: max existing 3-digit prefix + 1, zero-padded.
    pub fn next_version(&self) -> Result<String, ConfitureError> {
        let mut max = 0u32;
        if self.migrations_dir.exists() {
            let entries = fs::read_dir(&self.migrations_dir).map_err(|e| {
                ConfitureError::Differ(format!(
                    "Cannot read {}: {}",
                    self.migrations_dir.display(),
                    e
                ))
            })?;
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(caps) = VERSION_PREFIX_RE.captures(name) {
                    if let Ok(version) = caps[1].parse::<u32>() {
                        max = max.max(version);
                    }
                }
            }
        }
        if max >= 999 {
            return Err(ConfitureError::Differ(
                "Version space exhausted: 999 is the highest migration version".to_string(),
            ));
        }
        Ok(format!("{:03}", max + 1))
    }

    /// Generate a blank migration pair.
    ///
    /// Holds an exclusive lock on the migrations directory for the window
    /// between the version scan and the template write. In dry-run mode the
    /// version is computed and the preview rendered without writing.
    pub fn generate(&self, name: &str, dry_run: bool) -> Result<GenerateResult, ConfitureError> {
        if !SNAKE_CASE_NAME_RE.is_match(name) {
            return Err(ConfitureError::Differ(format!(
                "Invalid migration name '{}': use snake_case (lowercase letters, digits, \
                 underscores)",
                name
            )));
        }

        fs::create_dir_all(&self.migrations_dir).map_err(|e| {
            ConfitureError::Differ(format!(
                "Cannot create {}: {}",
                self.migrations_dir.display(),
                e
            ))
        })?;

        let _lock = if dry_run { None } else { Some(self.acquire_lock()?) };

        let version = self.next_version()?;
        let up_path = self
            .migrations_dir
            .join(format!("{}_{}.up.sql", version, name));
        let down_path = self
            .migrations_dir
            .join(format!("{}_{}.down.sql", version, name));

        let up_template = up_template(&version, name);
        let down_template = down_template(&version, name);

        let duplicate_versions = find_duplicate_versions(&self.migrations_dir)
            .into_iter()
            .map(|(version, files)| {
                let names = files
                    .iter()
                    .map(|f| f.file_name().unwrap_or_default().to_string_lossy().into_owned())
                    .collect();
                (version, names)
            })
            .collect();
        let name_conflicts = find_name_conflicts(&self.migrations_dir);

        if dry_run {
            return Ok(GenerateResult {
                version,
                name: name.to_string(),
                up_path,
                down_path,
                dry_run: true,
                duplicate_versions,
                name_conflicts,
                preview: Some(up_template),
            });
        }

        if up_path.exists() {
            return Err(ConfitureError::Differ(format!(
                "Migration file already exists: {}",
                up_path.display()
            )));
        }

        fs::write(&up_path, up_template).map_err(|e| {
            ConfitureError::Differ(format!("Cannot write {}: {}", up_path.display(), e))
        })?;
        fs::write(&down_path, down_template).map_err(|e| {
            ConfitureError::Differ(format!("Cannot write {}: {}", down_path.display(), e))
        })?;

        Ok(GenerateResult {
            version,
            name: name.to_string(),
            up_path,
            down_path,
            dry_run: false,
            duplicate_versions,
            name_conflicts,
            preview: None,
        })
    }

    /// Exclusive OS-level lock on the migrations directory.
    fn acquire_lock(&self) -> Result<fs::File, ConfitureError> {
        let lock_path = self.migrations_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                ConfitureError::Differ(format!(
                    "Cannot open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;
        file.lock_exclusive().map_err(|e| {
            ConfitureError::Differ(format!("Cannot lock migrations directory: {}", e))
        })?;
        Ok(file)
    }
}

fn up_template(version: &str, name: &str) -> String {
    format!(
        "-- Migration {}: {}\n--\n-- Forward migration. Applied by `confiture migrate up`.\n\n",
        version, name
    )
}

fn down_template(version: &str, name: &str) -> String {
    format!(
        "-- Migration {}: {} (rollback)\n--\n-- TODO: write the statements that undo {}.\n\n",
        version, name, name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = MigrationGenerator::new(tmp.path());
        assert_eq!(generator.next_version().unwrap(), "001");
    }

    #[test]
    fn test_next_version_gaps_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001_a.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("005_b.up.sql"), "").unwrap();

        let generator = MigrationGenerator::new(tmp.path());
        assert_eq!(generator.next_version().unwrap(), "006");
    }

    #[test]
    fn test_next_version_counts_legacy_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("007_legacy.py"), "").unwrap();

        let generator = MigrationGenerator::new(tmp.path());
        assert_eq!(generator.next_version().unwrap(), "008");
    }

    #[test]
    fn test_generate_writes_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = MigrationGenerator::new(tmp.path());
        let result = generator.generate("add_users", false).unwrap();

        assert_eq!(result.version, "001");
        assert!(result.up_path.exists());
        assert!(result.down_path.exists());
        let up = std::fs::read_to_string(&result.up_path).unwrap();
        assert!(up.contains("Migration 001: add_users"));
        let down = std::fs::read_to_string(&result.down_path).unwrap();
        assert!(down.contains("TODO"));
    }

    #[test]
    fn test_sequential_generation_without_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = MigrationGenerator::new(tmp.path());
        let first = generator.generate("first", false).unwrap();
        let second = generator.generate("second", false).unwrap();
        assert_eq!(first.version, "001");
        assert_eq!(second.version, "002");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = MigrationGenerator::new(tmp.path());
        let result = generator.generate("preview_me", true).unwrap();

        assert!(result.dry_run);
        assert!(!result.up_path.exists());
        assert!(result.preview.unwrap().contains("preview_me"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = MigrationGenerator::new(tmp.path());
        assert!(generator.generate("AddUsers", false).is_err());
        assert!(generator.generate("1starts_with_digit", false).is_err());
    }

    #[test]
    fn test_duplicate_versions_soft_warned() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("003_one.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("003_two.up.sql"), "").unwrap();

        let generator = MigrationGenerator::new(tmp.path());
        let result = generator.generate("three", false).unwrap();
        assert_eq!(result.version, "004");
        assert_eq!(result.duplicate_versions["003"].len(), 2);
    }

    #[test]
    fn test_name_conflicts_soft_warned() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001_add_users.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("002_add_users.up.sql"), "").unwrap();

        let generator = MigrationGenerator::new(tmp.path());
        let result = generator.generate("other", false).unwrap();
        assert!(result.name_conflicts.contains_key("add_users"));
    }
}
