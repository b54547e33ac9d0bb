//! Three-phase pg_restore orchestrator.
//!
//! Eliminates FK constraint race conditions during parallel restores by
//! running pre-data and post-data serially and only parallelising the data
//! phase, where no FK constraints exist yet. Requires custom (-Fc) or
//! directory (-Fd) format dumps.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::warn;

use crate::error::ConfitureError;

const PGDUMP_MAGIC: &[u8; 5] = b"PGDMP";

/// The three pg_restore sections, in execution order.
pub const SECTIONS: [(&str, bool); 3] =
    [("pre-data", false), ("data", true), ("post-data", false)];

/// Options for a three-phase restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Path to the dump (custom format file or directory format dir)
    pub backup_path: PathBuf,
    pub target_db: String,
    /// Host or socket directory path
    pub host: String,
    pub port: u16,
    /// Role to connect as; None uses the OS default
    pub username: Option<String>,
    /// Parallel workers for the data phase
    pub jobs: u32,
    pub no_owner: bool,
    pub no_acl: bool,
    /// Abort on first error (--exit-on-error). Overridden to false for the
    /// run when `parallel_restore` is set; the caller's options are never
    /// mutated.
    pub exit_on_error: bool,
    /// Run pg_restore via `sudo -u <superuser>`
    pub superuser: Option<String>,
    /// Verify at least this many tables exist after restore; 0 skips
    pub min_tables: u32,
    pub min_tables_schema: String,
    /// FK violations during the parallel data phase are transient noise;
    /// this forces `exit_on_error=false` for the run.
    pub parallel_restore: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            backup_path: PathBuf::new(),
            target_db: String::new(),
            host: "/var/run/postgresql".to_string(),
            port: 5432,
            username: None,
            jobs: 4,
            no_owner: false,
            no_acl: false,
            exit_on_error: true,
            superuser: None,
            min_tables: 0,
            min_tables_schema: "public".to_string(),
            parallel_restore: false,
        }
    }
}

/// Result from a restore run or an individual phase.
#[derive(Debug, Default, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub phases_completed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_count: Option<i64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Actionable hints for known error patterns
    pub diagnostics: Vec<String>,
}

/// Classification of one pg_restore stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrKind {
    Error,
    Warning,
    Info,
}

/// Classify a pg_restore stderr line by substring match.
pub fn classify_stderr_line(line: &str) -> StderrKind {
    if line.contains("pg_restore: error:") {
        StderrKind::Error
    } else if line.contains("pg_restore: warning:") {
        StderrKind::Warning
    } else {
        StderrKind::Info
    }
}

/// Validate that a dump is custom or directory format.
///
/// `--section` only works with custom (-Fc) and directory (-Fd) dumps. A
/// plain-text dump would silently apply everything on each call, producing
/// wrong results, so it is rejected with a remediation message.
pub fn validate_dump_format(backup_path: &Path) -> Result<(), ConfitureError> {
    let header = if backup_path.is_dir() {
        let toc = backup_path.join("toc.dat");
        if !toc.exists() {
            return Err(ConfitureError::Restore(format!(
                "{} is a directory but contains no toc.dat — not a valid pg_dump \
                 directory-format archive",
                backup_path.display()
            )));
        }
        read_prefix(&toc, 5)?
    } else {
        read_prefix(backup_path, 5)?
    };

    if header.len() >= 5 && &header[..5] == PGDUMP_MAGIC {
        return Ok(());
    }

    // Heuristic: plain-text dumps start with SQL comments or keywords
    if !backup_path.is_dir() {
        if let Ok(prefix) = read_prefix(backup_path, 200) {
            let text = String::from_utf8_lossy(&prefix);
            let trimmed = text.trim_start();
            if trimmed.starts_with("--")
                || trimmed.starts_with("SET ")
                || trimmed.starts_with("SELECT ")
                || trimmed.starts_with("CREATE ")
            {
                return Err(ConfitureError::Restore(
                    "Backup appears to be plain-text SQL format. The three-phase restore \
                     requires custom format (-Fc) or directory format (-Fd). Re-create the \
                     dump with:\n  pg_dump -Fc dbname > dump.pgdump"
                        .to_string(),
                ));
            }
        }
    }

    Err(ConfitureError::Restore(format!(
        "Unrecognised dump format for {}. confiture restore requires custom format (-Fc) \
         or directory format (-Fd).",
        backup_path.display()
    )))
}

fn read_prefix(path: &Path, len: usize) -> Result<Vec<u8>, ConfitureError> {
    let mut file = File::open(path)
        .map_err(|e| ConfitureError::Restore(format!("Cannot read backup file: {}", e)))?;
    let mut buf = vec![0u8; len];
    let read = file
        .read(&mut buf)
        .map_err(|e| ConfitureError::Restore(format!("Cannot read backup file: {}", e)))?;
    buf.truncate(read);
    Ok(buf)
}

/// Build the pg_restore argv for one section.
pub fn build_command(section: &str, options: &RestoreOptions, parallel: bool) -> Vec<String> {
    let mut cmd = Vec::new();
    if let Some(superuser) = &options.superuser {
        cmd.push("sudo".to_string());
        cmd.push("-u".to_string());
        cmd.push(superuser.clone());
    }
    cmd.push("pg_restore".to_string());
    cmd.push("-h".to_string());
    cmd.push(options.host.clone());
    cmd.push("-p".to_string());
    cmd.push(options.port.to_string());
    cmd.push("-d".to_string());
    cmd.push(options.target_db.clone());
    cmd.push(format!("--section={}", section));
    if let Some(username) = &options.username {
        cmd.push("-U".to_string());
        cmd.push(username.clone());
    }
    if options.exit_on_error {
        cmd.push("--exit-on-error".to_string());
    }
    if options.no_owner {
        cmd.push("--no-owner".to_string());
    }
    if options.no_acl {
        cmd.push("--no-acl".to_string());
    }
    if parallel && options.jobs > 1 {
        cmd.push("-j".to_string());
        cmd.push(options.jobs.to_string());
    }
    cmd.push(options.backup_path.to_string_lossy().into_owned());
    cmd
}

/// Actionable hints for known post-data error patterns.
pub fn diagnose_post_data_errors(lines: &[String]) -> Vec<String> {
    let mut hints = Vec::new();
    if lines.iter().any(|l| l.contains("out of shared memory")) {
        hints.push(
            "Hint: 'out of shared memory' during the post-data phase indicates that \
             max_locks_per_transaction is too low. For schemas with many partitions (2 000+), \
             set max_locks_per_transaction = 256 (or higher) in postgresql.conf and reload \
             PostgreSQL before retrying the restore."
                .to_string(),
        );
    }
    hints
}

/// Orchestrates a three-phase pg_restore.
#[derive(Debug, Default)]
pub struct DatabaseRestorer;

fn reborrow_stderr_callback<'a>(
    opt: &'a mut Option<&mut dyn FnMut(&str)>,
) -> Option<&'a mut dyn FnMut(&str)> {
    match opt {
        Some(cb) => Some(&mut **cb),
        None => None,
    }
}

impl DatabaseRestorer {
    pub fn new() -> Self {
        Self
    }

    /// Run the three-phase restore.
    ///
    /// Phases: pre-data (serial), data (parallel iff jobs > 1), post-data
    /// (serial). A phase failure is terminal; later phases do not run.
    pub fn restore(
        &self,
        options: &RestoreOptions,
        mut on_stderr_line: Option<&mut dyn FnMut(&str)>,
    ) -> Result<RestoreResult, ConfitureError> {
        validate_dump_format(&options.backup_path)?;

        // The caller's options object stays untouched; the override lives in
        // a run-scoped copy.
        let mut run_options = options.clone();
        if run_options.parallel_restore && run_options.exit_on_error {
            warn!(
                "parallel_restore=true: overriding exit_on_error to False. FK violations \
                 during the data phase are transient when using parallel workers and will \
                 not abort the restore."
            );
            run_options.exit_on_error = false;
        }

        let mut all_warnings = Vec::new();
        let mut phases_done = Vec::new();
        let mut post_data_lines = Vec::new();

        for (section, parallel) in SECTIONS {
            let callback = reborrow_stderr_callback(&mut on_stderr_line);
            let result = self.run_section(section, &run_options, parallel, callback)?;
            all_warnings.extend(result.warnings.clone());

            if section == "post-data" {
                post_data_lines.extend(result.errors.iter().cloned());
                post_data_lines.extend(result.warnings.iter().cloned());
            }

            if !result.success {
                let diagnostics = if section == "post-data" {
                    let mut lines = result.errors.clone();
                    lines.extend(result.warnings.clone());
                    diagnose_post_data_errors(&lines)
                } else {
                    Vec::new()
                };
                return Ok(RestoreResult {
                    success: false,
                    phases_completed: phases_done,
                    table_count: None,
                    errors: result.errors,
                    warnings: all_warnings,
                    diagnostics,
                });
            }
            phases_done.extend(result.phases_completed);
        }

        let diagnostics = diagnose_post_data_errors(&post_data_lines);

        if run_options.min_tables > 0 {
            let check = self.validate_table_count(&run_options)?;
            return Ok(RestoreResult {
                success: check.success,
                phases_completed: phases_done,
                table_count: check.table_count,
                errors: check.errors,
                warnings: all_warnings,
                diagnostics,
            });
        }

        Ok(RestoreResult {
            success: true,
            phases_completed: phases_done,
            table_count: None,
            errors: Vec::new(),
            warnings: all_warnings,
            diagnostics,
        })
    }

    /// Run pg_restore for a single section with streaming stderr.
    ///
    /// stdout is discarded and stderr consumed line-by-line while the child
    /// runs, so the pipe buffer cannot stall on verbose restores.
    fn run_section(
        &self,
        section: &str,
        options: &RestoreOptions,
        parallel: bool,
        mut on_stderr_line: Option<&mut dyn FnMut(&str)>,
    ) -> Result<RestoreResult, ConfitureError> {
        let argv = build_command(section, options, parallel);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConfitureError::Restore(
                        "pg_restore not found. Ensure PostgreSQL client tools are installed \
                         and on PATH."
                            .to_string(),
                    )
                } else {
                    ConfitureError::Restore(format!("Cannot spawn pg_restore: {}", e))
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConfitureError::Restore("pg_restore stderr unavailable".to_string()))?;
        let reader = BufReader::new(stderr);

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ConfitureError::Restore(format!(
                        "pg_restore {} phase interrupted: {}",
                        section, e
                    )));
                }
            };
            if let Some(ref mut callback) = on_stderr_line {
                callback(&line);
            }
            match classify_stderr_line(&line) {
                StderrKind::Error => errors.push(line),
                StderrKind::Warning => warnings.push(line),
                StderrKind::Info => {}
            }
        }

        let status = child.wait().map_err(|e| {
            ConfitureError::Restore(format!("pg_restore {} phase interrupted: {}", section, e))
        })?;

        let returncode = status.code().unwrap_or(-1);
        if returncode != 0 && (options.exit_on_error || !errors.is_empty()) {
            let errors = if errors.is_empty() {
                vec![format!("pg_restore exited with code {}", returncode)]
            } else {
                errors
            };
            return Ok(RestoreResult {
                success: false,
                phases_completed: Vec::new(),
                errors,
                warnings,
                ..Default::default()
            });
        }
        // Lenient mode (exit_on_error=false, no hard errors, non-zero exit):
        // treated as success

        Ok(RestoreResult {
            success: true,
            phases_completed: vec![section.to_string()],
            errors,
            warnings,
            ..Default::default()
        })
    }

    /// Count base tables in the target schema and compare with the minimum.
    ///
    /// pg_class is faster than information_schema.tables on large schemas;
    /// the schema name is a bound parameter.
    fn validate_table_count(
        &self,
        options: &RestoreOptions,
    ) -> Result<RestoreResult, ConfitureError> {
        let mut conninfo = format!(
            "host={} port={} dbname={}",
            options.host, options.port, options.target_db
        );
        if let Some(username) = &options.username {
            conninfo.push_str(&format!(" user={}", username));
        }

        let mut client =
            postgres::Client::connect(&conninfo, postgres::NoTls).map_err(|e| {
                ConfitureError::Restore(format!(
                    "Cannot connect to {} for table count validation: {}",
                    options.target_db, e
                ))
            })?;

        let row = client
            .query_one(
                "SELECT COUNT(*)
                 FROM pg_catalog.pg_class c
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                 WHERE c.relkind = 'r'
                   AND n.nspname = $1",
                &[&options.min_tables_schema],
            )
            .map_err(|e| {
                ConfitureError::Restore(format!("Table count validation failed: {}", e))
            })?;
        let count: i64 = row.get(0);

        let phases = SECTIONS.iter().map(|(s, _)| s.to_string()).collect();
        if count < options.min_tables as i64 {
            return Ok(RestoreResult {
                success: false,
                phases_completed: phases,
                table_count: Some(count),
                errors: vec![format!(
                    "Post-restore validation failed: found {} tables in schema '{}', \
                     expected at least {}",
                    count, options.min_tables_schema, options.min_tables
                )],
                ..Default::default()
            });
        }

        Ok(RestoreResult {
            success: true,
            phases_completed: phases,
            table_count: Some(count),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stderr_lines() {
        assert_eq!(
            classify_stderr_line("pg_restore: error: relation missing"),
            StderrKind::Error
        );
        assert_eq!(
            classify_stderr_line("pg_restore: warning: schema \"public\" already exists"),
            StderrKind::Warning
        );
        assert_eq!(
            classify_stderr_line("pg_restore: processing item 42"),
            StderrKind::Info
        );
    }

    #[test]
    fn test_rejects_plain_text_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("plain.sql");
        std::fs::write(&dump, "--\n-- PostgreSQL database dump\nSET client_encoding;").unwrap();

        let err = validate_dump_format(&dump).unwrap_err();
        assert!(err.to_string().contains("plain-text"));
        assert!(err.to_string().contains("-Fc"));
    }

    #[test]
    fn test_rejects_unrecognised_format() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("garbage.bin");
        std::fs::write(&dump, [0u8, 1, 2, 3, 4, 5]).unwrap();

        let err = validate_dump_format(&dump).unwrap_err();
        assert!(err.to_string().contains("Unrecognised"));
    }

    #[test]
    fn test_accepts_custom_format_magic() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.pgdump");
        std::fs::write(&dump, b"PGDMP\x01\x02").unwrap();
        assert!(validate_dump_format(&dump).is_ok());
    }

    #[test]
    fn test_directory_format_requires_toc() {
        let tmp = tempfile::tempdir().unwrap();
        let err = validate_dump_format(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("toc.dat"));

        std::fs::write(tmp.path().join("toc.dat"), b"PGDMP\x01").unwrap();
        assert!(validate_dump_format(tmp.path()).is_ok());
    }

    #[test]
    fn test_invalid_dump_never_spawns_pg_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("plain.sql");
        std::fs::write(&dump, "-- plain").unwrap();

        let options = RestoreOptions {
            backup_path: dump,
            target_db: "nope".to_string(),
            ..Default::default()
        };
        // Validation fails before any subprocess is attempted, so this
        // errors even where pg_restore is absent.
        let restorer = DatabaseRestorer::new();
        assert!(restorer.restore(&options, None).is_err());
    }

    #[test]
    fn test_build_command_sections_and_flags() {
        let options = RestoreOptions {
            backup_path: PathBuf::from("dump.pgdump"),
            target_db: "staging".to_string(),
            host: "db.internal".to_string(),
            port: 5433,
            username: Some("restorer".to_string()),
            jobs: 8,
            no_owner: true,
            no_acl: true,
            exit_on_error: true,
            ..Default::default()
        };

        let pre = build_command("pre-data", &options, false);
        assert!(pre.contains(&"--section=pre-data".to_string()));
        assert!(pre.contains(&"--exit-on-error".to_string()));
        assert!(pre.contains(&"--no-owner".to_string()));
        assert!(pre.contains(&"--no-acl".to_string()));
        assert!(!pre.contains(&"-j".to_string()));

        let data = build_command("data", &options, true);
        let j_pos = data.iter().position(|a| a == "-j").unwrap();
        assert_eq!(data[j_pos + 1], "8");
    }

    #[test]
    fn test_build_command_superuser_prefix() {
        let options = RestoreOptions {
            backup_path: PathBuf::from("dump.pgdump"),
            target_db: "staging".to_string(),
            superuser: Some("postgres".to_string()),
            ..Default::default()
        };
        let cmd = build_command("data", &options, false);
        assert_eq!(&cmd[..3], &["sudo", "-u", "postgres"]);
        assert_eq!(cmd[3], "pg_restore");
    }

    #[test]
    fn test_jobs_of_one_disables_parallel_flag() {
        let options = RestoreOptions {
            backup_path: PathBuf::from("dump.pgdump"),
            target_db: "staging".to_string(),
            jobs: 1,
            ..Default::default()
        };
        let cmd = build_command("data", &options, true);
        assert!(!cmd.contains(&"-j".to_string()));
    }

    #[test]
    fn test_diagnose_shared_memory() {
        let hints = diagnose_post_data_errors(&[
            "pg_restore: error: out of shared memory".to_string()
        ]);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("max_locks_per_transaction"));

        assert!(diagnose_post_data_errors(&["pg_restore: error: other".to_string()]).is_empty());
    }

    #[test]
    fn test_caller_options_not_mutated_by_parallel_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("plain.sql");
        std::fs::write(&dump, "-- plain").unwrap();

        let options = RestoreOptions {
            backup_path: dump,
            target_db: "x".to_string(),
            parallel_restore: true,
            exit_on_error: true,
            ..Default::default()
        };
        let restorer = DatabaseRestorer::new();
        let _ = restorer.restore(&options, None);
        // The override is run-scoped; the caller still sees their value.
        assert!(options.exit_on_error);
        assert!(options.parallel_restore);
    }
}
