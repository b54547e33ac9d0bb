//! Sequential seed application with a savepoint per file.
//!
//! Concatenating hundreds of multi-row INSERTs into one parse tree trips
//! the server's parser stack. Sequential mode keeps each parse small: every
//! file executes inside its own savepoint within a single outer
//! transaction, so one bad file can be rolled back without losing the rest.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ConfitureError;
use crate::migrate::Db;

/// One failed seed file and its error.
#[derive(Debug, Clone, Serialize)]
pub struct SeedFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a sequential seed run.
#[derive(Debug, Default, Serialize)]
pub struct SeedApplyResult {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<SeedFailure>,
}

/// Applies seed `.sql` files under a root directory.
pub struct SeedApplier {
    seeds_dir: PathBuf,
}

impl SeedApplier {
    pub fn new(seeds_dir: impl Into<PathBuf>) -> Self {
        Self {
            seeds_dir: seeds_dir.into(),
        }
    }

    /// All seed files in dependency-safe order: directory structure first,
    /// then filename.
    pub fn find_seed_files(&self) -> Result<Vec<PathBuf>, ConfitureError> {
        if !self.seeds_dir.exists() {
            return Err(ConfitureError::Seed {
                message: format!("Seeds directory not found: {}", self.seeds_dir.display()),
                seed_file: None,
            });
        }

        let mut files = Vec::new();
        collect_sql_files(&self.seeds_dir, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Apply every seed file sequentially, one savepoint per file.
    ///
    /// With `continue_on_error`, a failing file is rolled back to its
    /// savepoint and the run continues; otherwise the first failure ends
    /// the run (accumulated successes still commit, matching savepoint
    /// semantics).
    pub fn apply_sequential(
        &self,
        db: &mut Db,
        continue_on_error: bool,
    ) -> Result<SeedApplyResult, ConfitureError> {
        let files = self.find_seed_files()?;
        let mut result = SeedApplyResult::default();

        db.begin()?;

        for file in &files {
            let savepoint = savepoint_name(file);
            let sql = match fs::read_to_string(file) {
                Ok(sql) => sql,
                Err(e) => {
                    result.failed += 1;
                    result.failures.push(SeedFailure {
                        path: file.clone(),
                        error: format!("cannot read file: {}", e),
                    });
                    if continue_on_error {
                        continue;
                    }
                    break;
                }
            };

            db.create_savepoint(&savepoint)?;
            match db.execute(&sql) {
                Ok(()) => {
                    db.release_savepoint(&savepoint)?;
                    debug!(file = %file.display(), "seed file applied");
                    result.succeeded += 1;
                }
                Err(e) => {
                    db.rollback_to_savepoint(&savepoint);
                    result.failed += 1;
                    result.failures.push(SeedFailure {
                        path: file.clone(),
                        error: e.to_string(),
                    });
                    if !continue_on_error {
                        break;
                    }
                }
            }
        }

        db.commit()?;
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            "sequential seed run complete"
        );
        Ok(result)
    }
}

fn collect_sql_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfitureError> {
    let entries = fs::read_dir(dir).map_err(|e| ConfitureError::Seed {
        message: format!("Cannot read {}: {}", dir.display(), e),
        seed_file: None,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if path.extension().map(|e| e == "sql").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}

/// Savepoint name derived from the file stem; sanitised to an identifier.
fn savepoint_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "seed".to_string());
    let sanitised: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let mut name = format!("seed_{}", sanitised.to_lowercase());
    name.truncate(60);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savepoint_name_sanitised() {
        assert_eq!(
            savepoint_name(Path::new("seeds/01-users & roles.sql")),
            "seed_01_users___roles"
        );
        assert_eq!(savepoint_name(Path::new("large.sql")), "seed_large");
    }

    #[test]
    fn test_find_seed_files_recursive_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("10_base");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("20_extra.sql"), "").unwrap();
        std::fs::write(nested.join("users.sql"), "").unwrap();
        std::fs::write(nested.join("accounts.sql"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();

        let applier = SeedApplier::new(tmp.path());
        let files = applier.find_seed_files().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(
            names,
            vec!["10_base/accounts.sql", "10_base/users.sql", "20_extra.sql"]
        );
    }

    #[test]
    fn test_missing_seeds_dir_errors() {
        let applier = SeedApplier::new("/no/such/dir");
        assert!(applier.find_seed_files().is_err());
    }
}
