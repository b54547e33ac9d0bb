use std::path::PathBuf;

use crate::builder::SchemaBuilder;
use crate::config::Environment;
use crate::linter::{LintConfig, SchemaLinter};
use crate::schema::parse_sql;

pub fn run(
    env: String,
    project_dir: PathBuf,
    rules: Option<String>,
    exclude_tables: Option<String>,
    fail_on_warning: bool,
    json: bool,
) -> anyhow::Result<()> {
    let env_config = Environment::load(&env, &project_dir)?;
    let builder = SchemaBuilder::new(&env_config, &project_dir);
    let built = builder.build(true, None, false)?;
    let schema = parse_sql(&built);

    let mut config = match &rules {
        Some(rules) => {
            let keys: Vec<String> = super::split_csv(rules);
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            LintConfig::with_rules(&key_refs)
        }
        None => LintConfig::default(),
    };
    if let Some(excluded) = &exclude_tables {
        config.exclude_tables = super::split_csv(excluded);
    }

    let report = SchemaLinter::new(config).lint(&schema, &env);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for violation in &report.violations {
            eprintln!(
                "{} [{}] {}: {}",
                violation.severity, violation.rule_name, violation.location, violation.message
            );
            if let Some(fix) = &violation.suggested_fix {
                eprintln!("    fix: {}", fix);
            }
        }
        eprintln!();
        eprintln!(
            "Checked {} table(s), {} column(s) in {} ms",
            report.tables_checked, report.columns_checked, report.execution_time_ms
        );
        eprintln!(
            "Total: {} errors, {} warnings",
            report.errors_count, report.warnings_count
        );
    }

    if report.has_errors() || (fail_on_warning && report.has_warnings()) {
        std::process::exit(1);
    }

    Ok(())
}
