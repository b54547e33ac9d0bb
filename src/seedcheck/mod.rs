//! Multi-level seed validation orchestrator.
//!
//! Runs a user-selected prefix of five validation levels over a seed tree:
//!
//! 1. Static file scan (prep-seed targets, FK naming, UUID shape, UNION
//!    consistency)
//! 2. Schema coherence against the declared DDL, plus the cross-cutting
//!    consistency suite (FK / UNIQUE / NOT NULL / completeness)
//! 3. Resolver function presence
//! 4. Database dry-run of the resolvers (rolled back)
//! 5. Full execution including the seed inserts (still rolled back)
//!
//! With `stop_on_critical`, any level that produces an ERROR ends the run.

pub mod comparator;
pub mod consistency;
pub mod dryrun;
pub mod extract;
pub mod level1;
pub mod report;
pub mod schema_level;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfitureError;
use crate::migrate::Db;
use crate::schema::parse_sql;
use crate::seedcheck::consistency::{context_from_schema, ConsistencyValidator};
use crate::seedcheck::dryrun::DryRunValidator;
use crate::seedcheck::extract::DataExtractor;
use crate::seedcheck::level1::Level1SeedValidator;
use crate::seedcheck::report::ValidationReport;
use crate::seedcheck::schema_level::{ResolverPresenceValidator, SchemaCoherenceValidator};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    /// Highest level to run (1..=5)
    pub max_level: u8,
    pub seeds_dir: PathBuf,
    /// DDL tree root, required for levels 2+
    pub schema_dir: Option<PathBuf>,
    /// Required for levels 4+
    pub database_url: Option<String>,
    pub stop_on_critical: bool,
    pub show_progress: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_level: 3,
            seeds_dir: PathBuf::from("db/seeds"),
            schema_dir: None,
            database_url: None,
            stop_on_critical: true,
            show_progress: false,
        }
    }
}

/// Runs validation levels in order, collecting violations.
pub struct Orchestrator {
    pub config: OrchestrationConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestrationConfig) -> Self {
        Self { config }
    }

    /// Run levels 1..=max_level, stopping early on critical errors when
    /// configured.
    pub fn run(&self) -> Result<ValidationReport, ConfitureError> {
        if !(1..=5).contains(&self.config.max_level) {
            return Err(ConfitureError::Config(format!(
                "Invalid validation level: {} (expected 1-5)",
                self.config.max_level
            )));
        }
        if self.config.max_level >= 4 && self.config.database_url.is_none() {
            return Err(ConfitureError::Config(
                "Validation levels 4+ require a database URL".to_string(),
            ));
        }
        if self.config.max_level >= 2 && self.config.schema_dir.is_none() {
            return Err(ConfitureError::Config(
                "Validation levels 2+ require a schema directory".to_string(),
            ));
        }

        let mut report = ValidationReport::default();

        // Level 1: static file scan
        let seed_files = self.collect_seed_files()?;
        report.files_scanned = seed_files.len();
        let level1 = Level1SeedValidator::new();
        report.validators_run.push("Level1SeedValidator".to_string());
        for (path, sql) in &seed_files {
            report
                .violations
                .extend(level1.validate_seed_file(sql, &path.to_string_lossy()));
        }
        report.max_level_reached = 1;
        if self.should_stop(&report) {
            report.stopped_early = true;
            return Ok(report);
        }
        if self.config.max_level < 2 {
            return Ok(report);
        }

        // Shared inputs for the schema-aware levels
        let extractor = DataExtractor::new();
        let mut seed_data = extract::SeedData::new();
        for (_, sql) in &seed_files {
            extractor.extract_into(sql, &mut seed_data);
        }
        report.tables_scanned = seed_data.len();

        let schema_dir = self.config.schema_dir.as_ref().unwrap();
        let ddl = read_ddl_tree(schema_dir)?;
        let schema = parse_sql(&ddl);

        // Level 2: schema coherence + consistency suite
        debug!("running level 2 (schema coherence)");
        report
            .validators_run
            .push("SchemaCoherenceValidator".to_string());
        report
            .violations
            .extend(SchemaCoherenceValidator::new().validate(&seed_data, &schema));

        let context = context_from_schema(&schema);
        let (consistency_violations, consistency_run) =
            ConsistencyValidator::new(false).validate(&seed_data, &context);
        report.validators_run.extend(consistency_run);
        report.violations.extend(consistency_violations);

        report.max_level_reached = 2;
        if self.should_stop(&report) {
            report.stopped_early = true;
            return Ok(report);
        }
        if self.config.max_level < 3 {
            return Ok(report);
        }

        // Level 3: resolver presence
        debug!("running level 3 (resolver presence)");
        report
            .validators_run
            .push("ResolverPresenceValidator".to_string());
        report
            .violations
            .extend(ResolverPresenceValidator::new().validate(&seed_data, &ddl));
        report.max_level_reached = 3;
        if self.should_stop(&report) {
            report.stopped_early = true;
            return Ok(report);
        }
        if self.config.max_level < 4 {
            return Ok(report);
        }

        // Levels 4/5: database dry-run, everything rolled back
        let url = self.config.database_url.as_ref().unwrap();
        let mut db = Db::connect(url)?;
        let mut dry_run = DryRunValidator::new(&mut db);
        let seed_sql: String = seed_files
            .iter()
            .map(|(_, sql)| sql.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if self.config.max_level == 4 {
            debug!("running level 4 (resolver dry-run)");
            report.validators_run.push("DryRunValidator".to_string());
            report
                .violations
                .extend(dry_run.validate_resolvers(&ddl, &seed_sql, &context)?);
            report.max_level_reached = 4;
        } else {
            debug!("running level 5 (full execution)");
            report
                .validators_run
                .push("FullExecutionValidator".to_string());
            report.violations.extend(dry_run.validate_full_execution(
                &ddl,
                &seed_sql,
                &context,
                &seed_data,
            )?);
            report.max_level_reached = 5;
        }

        if self.should_stop(&report) {
            report.stopped_early = true;
        }
        Ok(report)
    }

    fn should_stop(&self, report: &ValidationReport) -> bool {
        self.config.stop_on_critical
            && report.has_errors()
            && report.max_level_reached < self.config.max_level
    }

    fn collect_seed_files(&self) -> Result<Vec<(PathBuf, String)>, ConfitureError> {
        let mut files = Vec::new();
        collect_sql(&self.config.seeds_dir, &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn collect_sql(dir: &Path, out: &mut Vec<(PathBuf, String)>) -> Result<(), ConfitureError> {
    if !dir.exists() {
        return Err(ConfitureError::Config(format!(
            "Seeds directory not found: {}",
            dir.display()
        )));
    }
    let entries = fs::read_dir(dir).map_err(|e| {
        ConfitureError::Validation(format!("Cannot read {}: {}", dir.display(), e))
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sql(&path, out)?;
        } else if path.extension().map(|e| e == "sql").unwrap_or(false) {
            let sql = fs::read_to_string(&path).map_err(|e| {
                ConfitureError::Validation(format!("Cannot read {}: {}", path.display(), e))
            })?;
            out.push((path, sql));
        }
    }
    Ok(())
}

/// Concatenate every `.sql` file under a schema tree (sorted walk).
fn read_ddl_tree(dir: &Path) -> Result<String, ConfitureError> {
    let mut files = Vec::new();
    collect_sql(dir, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files
        .into_iter()
        .map(|(_, sql)| sql)
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(tmp: &Path) -> (PathBuf, PathBuf) {
        let seeds = tmp.join("seeds");
        let schema = tmp.join("schema");
        std::fs::create_dir_all(&seeds).unwrap();
        std::fs::create_dir_all(&schema).unwrap();

        std::fs::write(
            schema.join("10_tables.sql"),
            "CREATE TABLE tb_users (pk_user UUID PRIMARY KEY, email TEXT NOT NULL UNIQUE);",
        )
        .unwrap();
        std::fs::write(
            seeds.join("01_users.sql"),
            "INSERT INTO tb_users (pk_user, email) VALUES \
             ('123e4567-e89b-12d3-a456-426614174000', 'a@x.io');",
        )
        .unwrap();

        (seeds, schema)
    }

    #[test]
    fn test_level1_only() {
        let tmp = tempfile::tempdir().unwrap();
        let (seeds, _) = write_fixture(tmp.path());

        let report = Orchestrator::new(OrchestrationConfig {
            max_level: 1,
            seeds_dir: seeds,
            ..Default::default()
        })
        .run()
        .unwrap();

        assert_eq!(report.max_level_reached, 1);
        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.validators_run, vec!["Level1SeedValidator"]);
    }

    #[test]
    fn test_level2_runs_consistency_suite() {
        let tmp = tempfile::tempdir().unwrap();
        let (seeds, schema) = write_fixture(tmp.path());

        let report = Orchestrator::new(OrchestrationConfig {
            max_level: 2,
            seeds_dir: seeds,
            schema_dir: Some(schema),
            ..Default::default()
        })
        .run()
        .unwrap();

        assert_eq!(report.max_level_reached, 2);
        assert!(report
            .validators_run
            .contains(&"SchemaCoherenceValidator".to_string()));
        assert!(report
            .validators_run
            .contains(&"ForeignKeyValidator".to_string()));
        assert!(!report.has_errors(), "{:?}", report.violations);
    }

    #[test]
    fn test_level3_reports_missing_resolver() {
        let tmp = tempfile::tempdir().unwrap();
        let (seeds, schema) = write_fixture(tmp.path());

        let report = Orchestrator::new(OrchestrationConfig {
            max_level: 3,
            seeds_dir: seeds,
            schema_dir: Some(schema),
            stop_on_critical: false,
            ..Default::default()
        })
        .run()
        .unwrap();

        assert_eq!(report.max_level_reached, 3);
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule == "ResolverPresence"));
    }

    #[test]
    fn test_stop_on_critical_halts_before_next_level() {
        let tmp = tempfile::tempdir().unwrap();
        let seeds = tmp.path().join("seeds");
        let schema = tmp.path().join("schema");
        std::fs::create_dir_all(&seeds).unwrap();
        std::fs::create_dir_all(&schema).unwrap();
        std::fs::write(schema.join("10_tables.sql"), "CREATE TABLE tb_x (id INT);").unwrap();
        // Bad UUID triggers a level-1 ERROR
        std::fs::write(
            seeds.join("01_bad.sql"),
            "INSERT INTO prep_seed.tb_x (pk) VALUES ('123e4567-e89b-12d3-a456-42661417400');",
        )
        .unwrap();

        let report = Orchestrator::new(OrchestrationConfig {
            max_level: 3,
            seeds_dir: seeds,
            schema_dir: Some(schema),
            stop_on_critical: true,
            ..Default::default()
        })
        .run()
        .unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.max_level_reached, 1);
        assert!(!report
            .validators_run
            .contains(&"ResolverPresenceValidator".to_string()));
    }

    #[test]
    fn test_level4_requires_database_url() {
        let tmp = tempfile::tempdir().unwrap();
        let (seeds, schema) = write_fixture(tmp.path());

        let err = Orchestrator::new(OrchestrationConfig {
            max_level: 4,
            seeds_dir: seeds,
            schema_dir: Some(schema),
            database_url: None,
            ..Default::default()
        })
        .run()
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let err = Orchestrator::new(OrchestrationConfig {
            max_level: 9,
            ..Default::default()
        })
        .run()
        .unwrap_err();
        assert!(err.to_string().contains("Invalid validation level"));
    }
}
