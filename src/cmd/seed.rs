use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Environment;
use crate::error::ConfitureError;
use crate::migrate::Db;
use crate::seed::applier::SeedApplier;
use crate::seed::convert::InsertToCopyConverter;
use crate::seedcheck::{OrchestrationConfig, Orchestrator};

use super::SeedCommands;

pub fn run(command: SeedCommands) -> anyhow::Result<()> {
    match command {
        SeedCommands::Validate {
            seeds_dir,
            schema_dir,
            level,
            env,
            project_dir,
            database_url,
            no_stop_on_critical,
            compare_seeds_dir,
            format,
        } => validate(
            seeds_dir,
            schema_dir,
            level,
            env,
            project_dir,
            database_url,
            no_stop_on_critical,
            compare_seeds_dir,
            format,
        ),
        SeedCommands::Apply {
            seeds_dir,
            env,
            project_dir,
            database_url,
            sequential,
            continue_on_error,
            json,
        } => apply(
            seeds_dir,
            env,
            project_dir,
            database_url,
            sequential,
            continue_on_error,
            json,
        ),
        SeedCommands::Convert {
            seeds_dir,
            check,
            output,
            json,
        } => convert(seeds_dir, check, output, json),
    }
}

#[allow(clippy::too_many_arguments)]
fn validate(
    seeds_dir: PathBuf,
    schema_dir: Option<PathBuf>,
    level: u8,
    env: Option<String>,
    project_dir: PathBuf,
    database_url: Option<String>,
    no_stop_on_critical: bool,
    compare_seeds_dir: Option<PathBuf>,
    format: String,
) -> anyhow::Result<()> {
    let database_url = match (database_url, &env) {
        (Some(url), _) => Some(url),
        (None, Some(env_name)) => {
            Some(Environment::load(env_name, &project_dir)?.database_url)
        }
        (None, None) => None,
    };

    let orchestrator = Orchestrator::new(OrchestrationConfig {
        max_level: level,
        seeds_dir: seeds_dir.clone(),
        schema_dir,
        database_url,
        stop_on_critical: !no_stop_on_critical,
        show_progress: false,
    });

    let mut report = match orchestrator.run() {
        Ok(report) => report,
        Err(e) => {
            // Usage / infrastructure problems exit 2
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Some(other_dir) = compare_seeds_dir {
        use crate::seedcheck::comparator::EnvironmentComparator;
        use crate::seedcheck::extract::DataExtractor;

        let extractor = DataExtractor::new();
        let (env1, _) = match extractor.extract_dir(&seeds_dir) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        };
        let (env2, _) = match extractor.extract_dir(&other_dir) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        };

        report.validators_run.push("EnvironmentComparator".to_string());
        for difference in EnvironmentComparator::new().compare(&env1, &env2) {
            report.violations.push(difference.to_violation());
        }
    }

    match format.as_str() {
        "json" => println!("{}", report.to_json()),
        "csv" => print!("{}", report.to_csv()),
        _ => eprint!("{}", report.to_text()),
    }

    if report.has_violations() {
        std::process::exit(1);
    }
    Ok(())
}

fn apply(
    seeds_dir: PathBuf,
    env: String,
    project_dir: PathBuf,
    database_url: Option<String>,
    sequential: bool,
    continue_on_error: bool,
    json: bool,
) -> anyhow::Result<()> {
    if !sequential {
        eprintln!("Use --sequential for files with 500+ rows:");
        eprintln!("  confiture seed apply --sequential --env {}", env);
        return Ok(());
    }

    if !seeds_dir.exists() {
        eprintln!("Seeds directory not found: {}", seeds_dir.display());
        std::process::exit(2);
    }

    let url = match database_url {
        Some(url) => url,
        None => match Environment::load(&env, &project_dir) {
            Ok(config) => config.database_url,
            Err(e) => {
                eprintln!("Failed to load environment {}: {}", env, e);
                std::process::exit(2);
            }
        },
    };

    let mut db = match Db::connect(&url) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(2);
        }
    };

    let applier = SeedApplier::new(&seeds_dir);
    let result = match applier.apply_sequential(&mut db, continue_on_error) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Seed application failed: {}", e);
            std::process::exit(2);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!(
            "Seed application complete: {} succeeded, {} failed",
            result.succeeded, result.failed
        );
        for failure in &result.failures {
            eprintln!("  failed {}: {}", failure.path.display(), failure.error);
        }
    }

    if result.failed > 0 && !continue_on_error {
        std::process::exit(1);
    }
    Ok(())
}

fn convert(
    seeds_dir: PathBuf,
    check: bool,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    if !seeds_dir.exists() {
        return Err(ConfitureError::Config(format!(
            "Seeds directory not found: {}",
            seeds_dir.display()
        ))
        .into());
    }

    let mut files = BTreeMap::new();
    collect_sql_files(&seeds_dir, &mut files)?;

    let converter = InsertToCopyConverter::new();
    let report = converter.convert_batch(&files);

    if !check {
        if let Some(out_dir) = &output {
            fs::create_dir_all(out_dir)?;
            for result in &report.results {
                let Some(copy) = &result.copy_format else { continue };
                let source = Path::new(&result.file_path);
                let stem = source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "seed".to_string());
                fs::write(out_dir.join(format!("{}.copy.sql", stem)), copy)?;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Converted {}/{} file(s) ({} not convertible)",
            report.successful, report.total_files, report.failed
        );
        for result in report.results.iter().filter(|r| !r.success) {
            eprintln!(
                "  {}: {}",
                result.file_path,
                result.reason.as_deref().unwrap_or("not convertible")
            );
        }
        if check {
            eprintln!("(check mode; nothing written)");
        }
    }

    Ok(())
}

fn collect_sql_files(dir: &Path, out: &mut BTreeMap<String, String>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if path.extension().map(|e| e == "sql").unwrap_or(false) {
            out.insert(path.display().to_string(), fs::read_to_string(&path)?);
        }
    }
    Ok(())
}
