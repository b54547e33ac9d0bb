use std::path::PathBuf;

use crate::restore::{DatabaseRestorer, RestoreOptions};

#[allow(clippy::too_many_arguments)]
pub fn run(
    backup_path: PathBuf,
    target_db: String,
    host: String,
    port: u16,
    username: Option<String>,
    jobs: u32,
    no_owner: bool,
    no_acl: bool,
    no_exit_on_error: bool,
    superuser: Option<String>,
    parallel_restore: bool,
    min_tables: u32,
    min_tables_schema: String,
    json: bool,
) -> anyhow::Result<()> {
    let options = RestoreOptions {
        backup_path,
        target_db,
        host,
        port,
        username,
        jobs,
        no_owner,
        no_acl,
        exit_on_error: !no_exit_on_error,
        superuser,
        min_tables,
        min_tables_schema,
        parallel_restore,
    };

    let restorer = DatabaseRestorer::new();

    let result = if json {
        restorer.restore(&options, None)?
    } else {
        let mut on_line = |line: &str| {
            if line.contains("pg_restore:") {
                eprintln!("  {}", line);
            }
        };
        let callback: &mut dyn FnMut(&str) = &mut on_line;
        restorer.restore(&options, Some(callback))?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!();
        eprintln!(
            "Phases completed: {}",
            if result.phases_completed.is_empty() {
                "none".to_string()
            } else {
                result.phases_completed.join(", ")
            }
        );
        if let Some(count) = result.table_count {
            eprintln!("Tables found: {}", count);
        }
        if !result.warnings.is_empty() {
            eprintln!("Warnings: {}", result.warnings.len());
        }
        for error in &result.errors {
            eprintln!("Error: {}", error);
        }
        for hint in &result.diagnostics {
            eprintln!("{}", hint);
        }
        eprintln!(
            "Restore {}",
            if result.success { "succeeded" } else { "FAILED" }
        );
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
