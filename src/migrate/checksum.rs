//! Checksum verification for applied migrations.
//!
//! On apply, the SHA-256 of the migration file (LF-normalised) is stored
//! with the tracking row. Verification recomputes and compares; the
//! `on_mismatch` policy decides whether a drift fails the run, warns, or is
//! ignored. `fix` overwrites stored checksums with current file hashes.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{ChecksumMismatch, ConfitureError};
use crate::migrate::{find_migration_files, Db};
use crate::migrate::tracking::TrackingTable;

/// Behaviour when a stored checksum no longer matches the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMismatch {
    #[default]
    Fail,
    Warn,
    Ignore,
}

impl std::str::FromStr for OnMismatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(OnMismatch::Fail),
            "warn" => Ok(OnMismatch::Warn),
            "ignore" => Ok(OnMismatch::Ignore),
            _ => Err(format!(
                "Unknown checksum policy: {}. Valid options: fail, warn, ignore",
                s
            )),
        }
    }
}

/// SHA-256 over the canonicalised bytes of a migration file.
///
/// Line endings are normalised to LF so checkouts on different platforms
/// hash identically; trailing whitespace is preserved.
pub fn compute_checksum(path: &Path) -> Result<String, ConfitureError> {
    let bytes = fs::read(path).map_err(|e| {
        ConfitureError::migration(format!("Cannot read {}: {}", path.display(), e))
    })?;
    Ok(checksum_bytes(&bytes))
}

/// Checksum of in-memory content (LF-normalised).
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut normalized = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            normalized.push(b'\n');
            i += 2;
        } else {
            normalized.push(bytes[i]);
            i += 1;
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(&normalized);
    hex::encode(hasher.finalize())
}

/// Verifies stored checksums against migration files on disk.
pub struct ChecksumVerifier {
    pub on_mismatch: OnMismatch,
}

impl ChecksumVerifier {
    pub fn new(on_mismatch: OnMismatch) -> Self {
        Self { on_mismatch }
    }

    /// Collect every mismatch between stored checksums and current files.
    ///
    /// Rows without a stored checksum, and rows whose file is no longer on
    /// disk, are skipped.
    pub fn collect_mismatches(
        &self,
        db: &mut Db,
        tracking: &TrackingTable,
        migrations_dir: &Path,
    ) -> Result<Vec<ChecksumMismatch>, ConfitureError> {
        let files = find_migration_files(migrations_dir);
        let mut mismatches = Vec::new();

        for (version, name, stored) in tracking.stored_checksums(db)? {
            let Some(stored) = stored else { continue };
            let Some(file) = files.iter().find(|f| f.version == version) else {
                continue;
            };
            let actual = compute_checksum(&file.up_path)?;
            if actual != stored {
                mismatches.push(ChecksumMismatch {
                    version,
                    name,
                    file_path: file.up_path.clone(),
                    expected: stored,
                    actual,
                });
            }
        }

        Ok(mismatches)
    }

    /// Verify and apply the mismatch policy. With `Ignore` no check runs.
    pub fn verify(
        &self,
        db: &mut Db,
        tracking: &TrackingTable,
        migrations_dir: &Path,
    ) -> Result<Vec<ChecksumMismatch>, ConfitureError> {
        if self.on_mismatch == OnMismatch::Ignore {
            return Ok(Vec::new());
        }

        let mismatches = self.collect_mismatches(db, tracking, migrations_dir)?;
        if mismatches.is_empty() {
            return Ok(mismatches);
        }

        match self.on_mismatch {
            OnMismatch::Fail => Err(ConfitureError::ChecksumVerification { mismatches }),
            OnMismatch::Warn => {
                for m in &mismatches {
                    warn!("checksum drift: {}", m);
                }
                Ok(mismatches)
            }
            OnMismatch::Ignore => Ok(Vec::new()),
        }
    }

    /// Overwrite stored checksums with current file hashes.
    ///
    /// This erases the drift record; callers must warn before invoking.
    pub fn fix(
        &self,
        db: &mut Db,
        tracking: &TrackingTable,
        migrations_dir: &Path,
    ) -> Result<Vec<ChecksumMismatch>, ConfitureError> {
        let mismatches = self.collect_mismatches(db, tracking, migrations_dir)?;
        for m in &mismatches {
            tracking.update_checksum(db, &m.version, &m.actual)?;
        }
        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_lf_normalisation() {
        assert_eq!(
            checksum_bytes(b"CREATE TABLE t (id INT);\r\nSELECT 1;\r\n"),
            checksum_bytes(b"CREATE TABLE t (id INT);\nSELECT 1;\n"),
        );
    }

    #[test]
    fn test_checksum_preserves_trailing_whitespace() {
        assert_ne!(
            checksum_bytes(b"SELECT 1;  \n"),
            checksum_bytes(b"SELECT 1;\n"),
        );
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let sum = checksum_bytes(b"");
        assert_eq!(sum.len(), 64);
        assert_eq!(
            sum,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_compute_checksum_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("001_x.up.sql");
        std::fs::write(&path, "CREATE TABLE t (id INT);\n").unwrap();
        assert_eq!(
            compute_checksum(&path).unwrap(),
            checksum_bytes(b"CREATE TABLE t (id INT);\n")
        );
    }

    #[test]
    fn test_on_mismatch_parse() {
        assert_eq!("fail".parse::<OnMismatch>().unwrap(), OnMismatch::Fail);
        assert_eq!("WARN".parse::<OnMismatch>().unwrap(), OnMismatch::Warn);
        assert_eq!("ignore".parse::<OnMismatch>().unwrap(), OnMismatch::Ignore);
        assert!("explode".parse::<OnMismatch>().is_err());
    }
}
