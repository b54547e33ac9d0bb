//! Migration model, file discovery, and the database connection wrapper.
//!
//! On-disk migrations are SQL pairs: `{version}_{name}.up.sql` with an
//! optional `{version}_{name}.down.sql`. Programmatic migrations construct
//! [`Migration`] records directly, attaching per-phase hook statements. Both
//! forms normalise to the same record; the tracking table is agnostic to
//! form.

pub mod checksum;
pub mod executor;
pub mod hooks;
pub mod lock;
pub mod tracking;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfitureError;
use hooks::Hook;

/// `{version}_{name}.up.sql` naming pattern
static UP_SQL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3})_([a-z][a-z0-9_]*)\.up\.sql$").unwrap());

/// `{version}_{name}.down.sql` naming pattern
static DOWN_SQL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3})_([a-z][a-z0-9_]*)\.down\.sql$").unwrap());

/// A migration normalised to a common record, whatever its source form.
#[derive(Debug, Clone, Default)]
pub struct Migration {
    /// Zero-padded 3-digit version ("001".."999")
    pub version: String,
    /// snake_case migration name
    pub name: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
    /// Hook statements grouped by phase; executed in declaration order
    pub hooks: Vec<Hook>,
    pub strict_mode: bool,
    /// Path of the .up.sql file, when loaded from disk
    pub source_path: Option<PathBuf>,
}

impl Migration {
    pub fn new(version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_up_sql(mut self, sql: impl Into<String>) -> Self {
        self.up_sql = sql.into();
        self
    }

    pub fn with_down_sql(mut self, sql: impl Into<String>) -> Self {
        self.down_sql = Some(sql.into());
        self
    }

    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// A discovered migration file pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: Option<PathBuf>,
}

impl MigrationFile {
    /// Load file contents into a [`Migration`] record.
    pub fn load(&self) -> Result<Migration, ConfitureError> {
        let up_sql = fs::read_to_string(&self.up_path).map_err(|e| {
            ConfitureError::migration_for(
                format!("Cannot read {}: {}", self.up_path.display(), e),
                &self.version,
                &self.name,
            )
        })?;
        let down_sql = match &self.down_path {
            Some(path) => Some(fs::read_to_string(path).map_err(|e| {
                ConfitureError::migration_for(
                    format!("Cannot read {}: {}", path.display(), e),
                    &self.version,
                    &self.name,
                )
            })?),
            None => None,
        };
        Ok(Migration {
            version: self.version.clone(),
            name: self.name.clone(),
            up_sql,
            down_sql,
            hooks: Vec::new(),
            strict_mode: false,
            source_path: Some(self.up_path.clone()),
        })
    }
}

/// Extract the version prefix from a migration filename.
pub fn version_from_filename(filename: &str) -> Option<String> {
    filename.split('_').next().map(str::to_string)
}

/// Find all migration file pairs, sorted by ascending version.
pub fn find_migration_files(migrations_dir: &Path) -> Vec<MigrationFile> {
    if !migrations_dir.exists() {
        return Vec::new();
    }

    let mut downs: BTreeMap<(String, String), PathBuf> = BTreeMap::new();
    let mut ups: Vec<(String, String, PathBuf)> = Vec::new();

    let entries = match fs::read_dir(migrations_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(caps) = UP_SQL_RE.captures(name) {
            ups.push((caps[1].to_string(), caps[2].to_string(), path));
        } else if let Some(caps) = DOWN_SQL_RE.captures(name) {
            downs.insert((caps[1].to_string(), caps[2].to_string()), path);
        }
    }

    ups.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    ups.into_iter()
        .map(|(version, name, up_path)| {
            let down_path = downs.get(&(version.clone(), name.clone())).cloned();
            MigrationFile {
                version,
                name,
                up_path,
                down_path,
            }
        })
        .collect()
}

/// `.sql` files under the migrations directory that match neither the
/// `.up.sql` nor the `.down.sql` pattern. Ignored by apply, reported by
/// `migrate validate`, and a hard stop for `migrate up` in strict mode.
pub fn find_orphan_sql_files(migrations_dir: &Path) -> Vec<PathBuf> {
    if !migrations_dir.exists() {
        return Vec::new();
    }

    let mut orphans = Vec::new();
    let entries = match fs::read_dir(migrations_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".sql") {
            continue;
        }
        if !UP_SQL_RE.is_match(name) && !DOWN_SQL_RE.is_match(name) {
            orphans.push(path);
        }
    }

    orphans.sort();
    orphans
}

/// Map version → files for versions claimed by more than one migration.
pub fn find_duplicate_versions(migrations_dir: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut by_version: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in find_migration_files(migrations_dir) {
        by_version
            .entry(file.version.clone())
            .or_default()
            .push(file.up_path.clone());
    }
    by_version.retain(|_, files| files.len() > 1);
    by_version
}

/// Map name → versions for names shared across different versions.
pub fn find_name_conflicts(migrations_dir: &Path) -> BTreeMap<String, Vec<String>> {
    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in find_migration_files(migrations_dir) {
        let versions = by_name.entry(file.name.clone()).or_default();
        if !versions.contains(&file.version) {
            versions.push(file.version.clone());
        }
    }
    by_name.retain(|_, versions| versions.len() > 1);
    by_name
}

/// Fail with `MIGR_106` (exit 3) when any version is claimed twice.
///
/// Runs before every write-side command so no partial work happens.
pub fn ensure_no_duplicate_versions(migrations_dir: &Path) -> Result<(), ConfitureError> {
    let duplicates = find_duplicate_versions(migrations_dir);
    if duplicates.is_empty() {
        return Ok(());
    }

    let versions: Vec<&str> = duplicates.keys().map(String::as_str).collect();
    let conflicting_files: Vec<PathBuf> = duplicates.values().flatten().cloned().collect();
    Err(ConfitureError::MigrationConflict {
        message: format!("Duplicate migration version(s): {}", versions.join(", ")),
        conflicting_files,
    })
}

/// Blocking connection to the target database.
///
/// Owned by the command driver and passed to components by reference;
/// components never close it. Statements run in autocommit unless an
/// explicit `begin` opened a transaction.
pub struct Db {
    client: postgres::Client,
}

impl Db {
    /// Connect with a `postgresql://` URL.
    pub fn connect(url: &str) -> Result<Self, ConfitureError> {
        let client = postgres::Client::connect(url, postgres::NoTls)
            .map_err(|e| ConfitureError::Config(format!("Database connection failed: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: postgres::Client) -> Self {
        Self { client }
    }

    /// Execute one or more statements, wrapping failures with SQL context.
    pub fn execute(&mut self, sql: &str) -> Result<(), ConfitureError> {
        self.client.batch_execute(sql).map_err(|e| ConfitureError::Sql {
            sql: sql.to_string(),
            params: Vec::new(),
            source: e,
        })
    }

    /// Execute a parameterised statement, returning the affected row count.
    pub fn execute_params(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<u64, ConfitureError> {
        self.client.execute(sql, params).map_err(|e| ConfitureError::Sql {
            sql: sql.to_string(),
            params: params.iter().map(|p| format!("{:?}", p)).collect(),
            source: e,
        })
    }

    /// Run a parameterised query.
    pub fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<postgres::Row>, ConfitureError> {
        self.client.query(sql, params).map_err(|e| ConfitureError::Sql {
            sql: sql.to_string(),
            params: params.iter().map(|p| format!("{:?}", p)).collect(),
            source: e,
        })
    }

    /// Run a query expected to return exactly one row.
    pub fn query_one(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<postgres::Row, ConfitureError> {
        self.client.query_one(sql, params).map_err(|e| ConfitureError::Sql {
            sql: sql.to_string(),
            params: params.iter().map(|p| format!("{:?}", p)).collect(),
            source: e,
        })
    }

    pub fn begin(&mut self) -> Result<(), ConfitureError> {
        self.execute("BEGIN")
    }

    pub fn commit(&mut self) -> Result<(), ConfitureError> {
        self.execute("COMMIT")
    }

    pub fn rollback(&mut self) -> Result<(), ConfitureError> {
        self.execute("ROLLBACK")
    }

    pub fn create_savepoint(&mut self, name: &str) -> Result<(), ConfitureError> {
        self.execute(&format!("SAVEPOINT {}", name))
    }

    pub fn release_savepoint(&mut self, name: &str) -> Result<(), ConfitureError> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name))
    }

    /// Rollback to a savepoint; falls back to a full rollback when the
    /// savepoint itself is gone.
    pub fn rollback_to_savepoint(&mut self, name: &str) {
        if self
            .execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .is_err()
        {
            let _ = self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_filename() {
        assert_eq!(
            version_from_filename("042_add_column.up.sql"),
            Some("042".to_string())
        );
        assert_eq!(version_from_filename("001_x.py"), Some("001".to_string()));
    }

    #[test]
    fn test_find_migration_files_sorted_and_paired() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("002_add_orders.up.sql"), "CREATE TABLE o ();").unwrap();
        std::fs::write(tmp.path().join("001_add_users.up.sql"), "CREATE TABLE u ();").unwrap();
        std::fs::write(tmp.path().join("001_add_users.down.sql"), "DROP TABLE u;").unwrap();

        let files = find_migration_files(tmp.path());
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].version, "001");
        assert!(files[0].down_path.is_some());
        assert_eq!(files[1].version, "002");
        assert!(files[1].down_path.is_none());
    }

    #[test]
    fn test_orphan_detection() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001_ok.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("003_x.sql"), "").unwrap();
        std::fs::write(tmp.path().join("notes.sql"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();

        let orphans = find_orphan_sql_files(tmp.path());
        let names: Vec<String> = orphans
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["003_x.sql", "notes.sql"]);
    }

    #[test]
    fn test_bad_names_ignored_by_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        // Wrong version width and uppercase names do not match the pattern
        std::fs::write(tmp.path().join("01_short.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("001_Bad.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("001_good.up.sql"), "").unwrap();

        let files = find_migration_files(tmp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "good");
    }

    #[test]
    fn test_duplicate_versions() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("003_first.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("003_second.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("004_fine.up.sql"), "").unwrap();

        let duplicates = find_duplicate_versions(tmp.path());
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates["003"].len(), 2);

        let err = ensure_no_duplicate_versions(tmp.path()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        match err {
            ConfitureError::MigrationConflict {
                conflicting_files, ..
            } => assert_eq!(conflicting_files.len(), 2),
            other => panic!("expected MigrationConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_name_conflicts_soft() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001_add_users.up.sql"), "").unwrap();
        std::fs::write(tmp.path().join("002_add_users.up.sql"), "").unwrap();

        let conflicts = find_name_conflicts(tmp.path());
        assert_eq!(conflicts["add_users"], vec!["001".to_string(), "002".to_string()]);
        // Name conflicts never block
        assert!(ensure_no_duplicate_versions(tmp.path()).is_ok());
    }

    #[test]
    fn test_load_migration_pair() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("001_add_users.up.sql"), "CREATE TABLE u ();").unwrap();
        std::fs::write(tmp.path().join("001_add_users.down.sql"), "DROP TABLE u;").unwrap();

        let files = find_migration_files(tmp.path());
        let migration = files[0].load().unwrap();
        assert_eq!(migration.version, "001");
        assert_eq!(migration.name, "add_users");
        assert!(migration.up_sql.contains("CREATE TABLE"));
        assert_eq!(migration.down_sql.as_deref(), Some("DROP TABLE u;"));
    }
}
