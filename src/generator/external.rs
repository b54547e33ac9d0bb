//! External migration generator invocation.
//!
//! A named generator is a shell command template with `{from}`, `{to}` and
//! `{output}` placeholders (e.g. migra or apgdiff). The driver substitutes
//! shell-quoted paths, runs the command, post-processes the output
//! (transaction wrapper stripped, empty output rejected), and writes a
//! rollback stub only when one does not already exist.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::config::MigrationGeneratorConfig;
use crate::error::ConfitureError;

/// Outcome of one external generation run.
#[derive(Debug, Serialize)]
pub struct ExternalGenerateResult {
    pub command: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
    pub down_stub_written: bool,
    pub dry_run: bool,
}

/// Strip surrounding `BEGIN;` / `COMMIT;` lines from generator output.
///
/// Only exact lines match (case-insensitive, optional semicolon);
/// `BEGIN DEFERRED` and mid-line occurrences survive untouched. Leading and
/// trailing blank lines collapse.
pub fn strip_transaction_wrapper(sql: &str) -> String {
    let kept: Vec<&str> = sql
        .lines()
        .filter(|line| {
            let trimmed = line.trim().trim_end_matches(';').trim();
            !(trimmed.eq_ignore_ascii_case("BEGIN") || trimmed.eq_ignore_ascii_case("COMMIT"))
        })
        .collect();

    let mut start = 0;
    while start < kept.len() && kept[start].trim().is_empty() {
        start += 1;
    }
    let mut end = kept.len();
    while end > start && kept[end - 1].trim().is_empty() {
        end -= 1;
    }

    if start >= end {
        return String::new();
    }
    let mut out = kept[start..end].join("\n");
    out.push('\n');
    out
}

/// Single-quote a path for POSIX shells.
fn shell_quote(path: &Path) -> String {
    let text = path.to_string_lossy();
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Driver for one configured external generator.
pub struct ExternalGenerator<'a> {
    pub name: &'a str,
    pub config: &'a MigrationGeneratorConfig,
}

impl<'a> ExternalGenerator<'a> {
    pub fn new(name: &'a str, config: &'a MigrationGeneratorConfig) -> Self {
        Self { name, config }
    }

    fn render_command(&self, from: &Path, to: &Path, output: &Path) -> String {
        self.config
            .command
            .replace("{from}", &shell_quote(from))
            .replace("{to}", &shell_quote(to))
            .replace("{output}", &shell_quote(output))
    }

    /// Run the generator, writing `up_path` and a `down` stub.
    ///
    /// In dry-run mode the command is rendered but not executed and nothing
    /// is written.
    pub fn generate(
        &self,
        from: &Path,
        to: &Path,
        up_path: &Path,
        down_path: &Path,
        dry_run: bool,
    ) -> Result<ExternalGenerateResult, ConfitureError> {
        self.config
            .validate()
            .map_err(|e| ConfitureError::Config(format!("Generator '{}': {}", self.name, e)))?;

        if !from.exists() {
            return Err(ConfitureError::Config(format!(
                "Generator input not found: {}",
                from.display()
            )));
        }
        if !to.exists() {
            return Err(ConfitureError::Config(format!(
                "Generator input not found: {}",
                to.display()
            )));
        }

        let command = self.render_command(from, to, up_path);

        if dry_run {
            return Ok(ExternalGenerateResult {
                command,
                up_path: up_path.to_path_buf(),
                down_path: down_path.to_path_buf(),
                down_stub_written: false,
                dry_run: true,
            });
        }

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| ConfitureError::ExternalGenerator {
                message: format!("Cannot run generator '{}': {}", self.name, e),
                returncode: None,
                stderr: None,
            })?;

        if !output.status.success() {
            return Err(ConfitureError::ExternalGenerator {
                message: format!(
                    "Generator '{}' exited with code {}",
                    self.name,
                    output.status.code().unwrap_or(-1)
                ),
                returncode: output.status.code(),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            });
        }

        let raw = fs::read_to_string(up_path).map_err(|e| ConfitureError::ExternalGenerator {
            message: format!(
                "Generator '{}' produced no readable output at {}: {}",
                self.name,
                up_path.display(),
                e
            ),
            returncode: None,
            stderr: None,
        })?;

        let cleaned = strip_transaction_wrapper(&raw);
        if cleaned.trim().is_empty() {
            return Err(ConfitureError::ExternalGenerator {
                message: format!(
                    "Generator '{}' produced an empty migration for {}",
                    self.name,
                    up_path.display()
                ),
                returncode: None,
                stderr: None,
            });
        }
        fs::write(up_path, &cleaned).map_err(|e| ConfitureError::ExternalGenerator {
            message: format!("Cannot write {}: {}", up_path.display(), e),
            returncode: None,
            stderr: None,
        })?;

        // The stub never overwrites a hand-written rollback
        let down_stub_written = if down_path.exists() {
            false
        } else {
            fs::write(
                down_path,
                "-- TODO: write the rollback for this generated migration.\n",
            )
            .map_err(|e| ConfitureError::ExternalGenerator {
                message: format!("Cannot write {}: {}", down_path.display(), e),
                returncode: None,
                stderr: None,
            })?;
            true
        };

        Ok(ExternalGenerateResult {
            command,
            up_path: up_path.to_path_buf(),
            down_path: down_path.to_path_buf(),
            down_stub_written,
            dry_run: false,
        })
    }
}
