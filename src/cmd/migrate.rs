use std::fs;
use std::path::PathBuf;

use serde_json::json;
use tracing::warn;

use crate::baseline::BaselineDetector;
use crate::builder::SchemaBuilder;
use crate::config::Environment;
use crate::differ;
use crate::error::ConfitureError;
use crate::generator::external::ExternalGenerator;
use crate::generator::MigrationGenerator;
use crate::introspect::{render_ddl, Introspector};
use crate::migrate::checksum::{ChecksumVerifier, OnMismatch};
use crate::migrate::executor::{Migrator, RebuildOptions};
use crate::migrate::lock::MigrationLock;
use crate::migrate::{
    ensure_no_duplicate_versions, find_duplicate_versions, find_migration_files,
    find_name_conflicts, find_orphan_sql_files, Db,
};
use crate::schema::parse_sql;
use crate::views::ViewManager;

use super::MigrateCommands;

pub fn run(command: MigrateCommands) -> anyhow::Result<()> {
    match command {
        MigrateCommands::Up {
            env,
            project_dir,
            migrations_dir,
            target,
            force,
            strict,
            verify_checksums,
            on_checksum_mismatch,
            no_lock,
            lock_timeout,
            json,
        } => up(
            env,
            project_dir,
            migrations_dir,
            target,
            force,
            strict,
            verify_checksums,
            on_checksum_mismatch,
            no_lock,
            lock_timeout,
            json,
        ),
        MigrateCommands::Down {
            env,
            project_dir,
            migrations_dir,
            steps,
            no_lock,
            lock_timeout,
            json,
        } => down(env, project_dir, migrations_dir, steps, no_lock, lock_timeout, json),
        MigrateCommands::Status {
            env,
            project_dir,
            migrations_dir,
            format,
        } => status(env, project_dir, migrations_dir, format),
        MigrateCommands::Baseline {
            env,
            project_dir,
            migrations_dir,
            through,
            detect,
            dry_run,
            json,
        } => baseline(env, project_dir, migrations_dir, through, detect, dry_run, json),
        MigrateCommands::Reinit {
            env,
            project_dir,
            migrations_dir,
            through,
            dry_run,
            yes,
            json,
        } => reinit(env, project_dir, migrations_dir, through, dry_run, yes, json),
        MigrateCommands::Rebuild {
            env,
            project_dir,
            migrations_dir,
            apply_seeds,
            seeds_dir,
            no_drop_schemas,
            no_backup,
            dry_run,
            yes,
            json,
        } => rebuild(
            env,
            project_dir,
            migrations_dir,
            apply_seeds,
            seeds_dir,
            no_drop_schemas,
            no_backup,
            dry_run,
            yes,
            json,
        ),
        MigrateCommands::Validate {
            migrations_dir,
            json,
        } => validate(migrations_dir, json),
        MigrateCommands::Fix {
            migrations_dir,
            dry_run,
            json,
        } => fix(migrations_dir, dry_run, json),
        MigrateCommands::Generate {
            name,
            migrations_dir,
            generator,
            from,
            to,
            env,
            project_dir,
            dry_run,
            verbose,
            json,
        } => generate(
            name,
            migrations_dir,
            generator,
            from,
            to,
            env,
            project_dir,
            dry_run,
            verbose,
            json,
        ),
        MigrateCommands::Diff {
            old,
            new,
            live,
            env,
            project_dir,
            format,
            output,
        } => diff(old, new, live, env, project_dir, format, output),
        MigrateCommands::Verify {
            env,
            project_dir,
            migrations_dir,
            fix,
            json,
        } => verify(env, project_dir, migrations_dir, fix, json),
    }
}

fn connect(env_config: &Environment) -> Result<Db, ConfitureError> {
    Db::connect(&env_config.database_url)
}

#[allow(clippy::too_many_arguments)]
fn up(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    target: Option<String>,
    force: bool,
    strict: bool,
    verify_checksums: bool,
    on_checksum_mismatch: String,
    no_lock: bool,
    lock_timeout: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    // Duplicate scan is a hard block and needs no database
    ensure_no_duplicate_versions(&migrations_dir)?;

    let env_config = Environment::load(&env, &project_dir)?;
    let on_mismatch: OnMismatch = on_checksum_mismatch
        .parse()
        .map_err(ConfitureError::Config)?;

    // CLI > env > the migration's own declared value
    let strict_mode = strict || env_config.migration.strict_mode;

    let mut lock_config = env_config.migration.locking.clone();
    if no_lock {
        warn!("migration locking disabled via --no-lock; dangerous in multi-writer environments");
        lock_config.enabled = false;
    }
    if let Some(timeout) = lock_timeout {
        lock_config.timeout_ms = timeout;
    }

    let mut db = connect(&env_config)?;
    let lock = MigrationLock::new(
        &env_config.database_url,
        lock_config,
        &env_config.migration.tracking_table,
    );
    let _guard = lock.acquire()?;

    if env_config.migration.view_helpers == "auto" {
        // Helper installation is best-effort; never blocks a migration run
        let mut views = ViewManager::new(&mut db);
        if let Err(e) = views.install_helpers() {
            warn!("view helper installation failed: {}", e);
        }
    }

    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);
    migrator.verify_checksums = verify_checksums;
    migrator.on_mismatch = on_mismatch;
    migrator.initialize()?;

    let applied = migrator.migrate_up(&migrations_dir, target.as_deref(), force, strict_mode)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "ok",
                "applied": applied,
                "count": applied.len(),
                "warnings": Vec::<String>::new(),
            }))?
        );
    } else if applied.is_empty() {
        eprintln!("No pending migrations to apply.");
    } else {
        eprintln!("Applied {} migration(s): {}", applied.len(), applied.join(", "));
    }

    Ok(())
}

fn down(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    steps: usize,
    no_lock: bool,
    lock_timeout: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    ensure_no_duplicate_versions(&migrations_dir)?;

    let env_config = Environment::load(&env, &project_dir)?;

    let mut lock_config = env_config.migration.locking.clone();
    if no_lock {
        lock_config.enabled = false;
    }
    if let Some(timeout) = lock_timeout {
        lock_config.timeout_ms = timeout;
    }

    let mut db = connect(&env_config)?;
    let lock = MigrationLock::new(
        &env_config.database_url,
        lock_config,
        &env_config.migration.tracking_table,
    );
    let _guard = lock.acquire()?;

    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);
    migrator.initialize()?;
    let rolled_back = migrator.migrate_down(&migrations_dir, steps)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "ok",
                "rolled_back": rolled_back,
                "count": rolled_back.len(),
            }))?
        );
    } else if rolled_back.is_empty() {
        eprintln!("Nothing to roll back.");
    } else {
        eprintln!(
            "Rolled back {} migration(s): {}",
            rolled_back.len(),
            rolled_back.join(", ")
        );
    }

    Ok(())
}

fn status(
    env: Option<String>,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    format: String,
) -> anyhow::Result<()> {
    if format != "table" && format != "json" {
        eprintln!("Invalid format: {}. Use 'table' or 'json'", format);
        std::process::exit(3);
    }

    // Duplicate versions are fatal everywhere, including status
    if let Err(e) = ensure_no_duplicate_versions(&migrations_dir) {
        eprintln!("{}", crate::error::render(&anyhow::Error::new(e)));
        std::process::exit(3);
    }

    let files = find_migration_files(&migrations_dir);
    let orphans = find_orphan_sql_files(&migrations_dir);

    // Without an environment, only the file list is known (exit 0)
    let applied: Option<Vec<String>> = match &env {
        None => None,
        Some(env_name) => {
            let env_config = match Environment::load(env_name, &project_dir) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(3);
                }
            };
            let mut db = match connect(&env_config) {
                Ok(db) => db,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(3);
                }
            };
            let tracking =
                crate::migrate::tracking::TrackingTable::new(&env_config.migration.tracking_table);
            match tracking.exists(&mut db) {
                Ok(true) => match tracking.applied_versions(&mut db) {
                    Ok(versions) => Some(versions),
                    Err(e) => {
                        eprintln!("{}", e);
                        std::process::exit(3);
                    }
                },
                Ok(false) => {
                    // Tracking table absent is state, not failure: exit 2
                    if format == "json" {
                        let payload = json!({
                            "applied": [],
                            "pending": files.iter().map(|f| f.version.clone()).collect::<Vec<_>>(),
                            "current": null,
                            "total": files.len(),
                            "warning": "tracking table not found in target database",
                        });
                        println!("{}", serde_json::to_string_pretty(&payload)?);
                    } else {
                        eprintln!("Tracking table not found in target database.");
                        eprintln!("Run 'confiture migrate up' to initialize it.");
                    }
                    std::process::exit(2);
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(3);
                }
            }
        }
    };

    let applied_set: Vec<String> = applied.clone().unwrap_or_default();
    let mut applied_list = Vec::new();
    let mut pending_list = Vec::new();
    let mut migrations = Vec::new();

    for file in &files {
        let state = match &applied {
            None => "unknown",
            Some(_) if applied_set.contains(&file.version) => {
                applied_list.push(file.version.clone());
                "applied"
            }
            Some(_) => {
                pending_list.push(file.version.clone());
                "pending"
            }
        };
        migrations.push(json!({
            "version": file.version,
            "name": file.name,
            "status": state,
        }));
    }

    let current = applied_list.last().cloned();

    if format == "json" {
        let mut payload = json!({
            "applied": applied_list,
            "pending": pending_list,
            "current": current,
            "total": files.len(),
            "migrations": migrations,
        });
        if !orphans.is_empty() {
            payload["orphaned_migrations"] = json!(orphans
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
                .collect::<Vec<_>>());
        }
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if files.is_empty() {
            eprintln!("No migrations found in {}.", migrations_dir.display());
        }
        for entry in &migrations {
            eprintln!(
                "  {}  {}  {}",
                entry["version"].as_str().unwrap_or("?"),
                entry["name"].as_str().unwrap_or("?"),
                entry["status"].as_str().unwrap_or("?"),
            );
        }
        eprintln!();
        eprint!("Total: {} migration(s)", files.len());
        if applied.is_some() {
            eprintln!(" ({} applied, {} pending)", applied_list.len(), pending_list.len());
        } else {
            eprintln!(" (status unknown without --env)");
        }
        if !orphans.is_empty() {
            eprintln!(
                "Warning: {} orphaned .sql file(s) under migrations (ignored by apply)",
                orphans.len()
            );
        }
    }

    // Semantic exit codes: 1 = pending work, 0 = up to date or unknown
    if applied.is_some() && !pending_list.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn baseline(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    through: Option<String>,
    detect: bool,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let env_config = Environment::load(&env, &project_dir)?;
    let mut db = connect(&env_config)?;

    let through = match (through, detect) {
        (Some(version), _) => version,
        (None, true) => {
            // Detect the version from schema-history snapshots
            let snapshots_dir = project_dir.join(&env_config.migration.snapshots_dir);
            let live = render_ddl(&Introspector::new(&mut db).introspect(None)?);
            let mut detector = BaselineDetector::new(snapshots_dir);
            match detector.find_matching_snapshot(&live) {
                Some(version) => {
                    eprintln!("Detected baseline version {} from snapshots", version);
                    version
                }
                None => {
                    let closest = detector
                        .last_closest
                        .map(|(v, r)| format!(" (closest: {} at {:.2})", v, r))
                        .unwrap_or_default();
                    anyhow::bail!(
                        "No snapshot matches the live schema{}; pass --through explicitly",
                        closest
                    );
                }
            }
        }
        (None, false) => anyhow::bail!("--through <version> (or --detect) is required"),
    };

    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);
    migrator.initialize()?;
    let result = migrator.baseline(&migrations_dir, &through, dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let label = if dry_run { "Would mark" } else { "Marked" };
        eprintln!(
            "{} {} migration(s) as baseline: {}",
            label,
            result.migrations_marked.len(),
            result.migrations_marked.join(", ")
        );
        if !result.skipped_already_applied.is_empty() {
            eprintln!(
                "Skipped already applied: {}",
                result.skipped_already_applied.join(", ")
            );
        }
    }

    Ok(())
}

fn reinit(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    through: Option<String>,
    dry_run: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    if !dry_run && !yes {
        anyhow::bail!(
            "reinit clears the tracking table; re-run with --yes to confirm (or --dry-run to \
             preview)"
        );
    }

    let env_config = Environment::load(&env, &project_dir)?;
    let mut db = connect(&env_config)?;
    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);
    migrator.initialize()?;

    let result = migrator.reinit(&migrations_dir, through.as_deref(), dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let label = if dry_run { "Would delete" } else { "Deleted" };
        eprintln!("{} {} tracking row(s)", label, result.deleted_count);
        eprintln!(
            "Re-marked {} migration(s): {}",
            result.migrations_marked.len(),
            result.migrations_marked.join(", ")
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn rebuild(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    apply_seeds: bool,
    seeds_dir: PathBuf,
    no_drop_schemas: bool,
    no_backup: bool,
    dry_run: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    if !dry_run && !yes {
        anyhow::bail!(
            "rebuild drops user schemas; re-run with --yes to confirm (or --dry-run to preview)"
        );
    }

    let env_config = Environment::load(&env, &project_dir)?;
    let builder = SchemaBuilder::new(&env_config, &project_dir);
    let ddl = builder.build(true, None, false)?;

    let mut db = connect(&env_config)?;
    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);

    let options = RebuildOptions {
        drop_schemas: !no_drop_schemas,
        apply_seeds,
        backup_tracking: !no_backup,
        dry_run,
        migrations_dir,
        seeds_dir: apply_seeds.then_some(seeds_dir),
    };
    let result = migrator.rebuild(&ddl, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if result.dry_run {
            eprintln!("Dry run; nothing changed.");
        }
        eprintln!("Schemas dropped: {}", result.schemas_dropped.join(", "));
        eprintln!("Statements applied: {}", result.statements_applied);
        eprintln!("Migrations marked: {}", result.migrations_marked.len());
        for warning in &result.warnings {
            eprintln!("Warning: {}", warning);
        }
        if let Some(seeds) = &result.seeds {
            eprintln!("Seeds: {} succeeded, {} failed", seeds.succeeded, seeds.failed);
        }
    }

    Ok(())
}

fn validate(migrations_dir: PathBuf, json: bool) -> anyhow::Result<()> {
    let duplicates = find_duplicate_versions(&migrations_dir);
    let orphans = find_orphan_sql_files(&migrations_dir);
    let name_conflicts = find_name_conflicts(&migrations_dir);
    let files = find_migration_files(&migrations_dir);

    let missing_down: Vec<String> = files
        .iter()
        .filter(|f| f.down_path.is_none())
        .map(|f| f.version.clone())
        .collect();

    // Idempotency scan: bare CREATE TABLE / CREATE INDEX without IF NOT EXISTS
    let mut non_idempotent: Vec<String> = Vec::new();
    for file in &files {
        if let Ok(sql) = fs::read_to_string(&file.up_path) {
            if has_non_idempotent_ddl(&sql) {
                non_idempotent.push(file.version.clone());
            }
        }
    }

    let has_errors = !duplicates.is_empty();
    let has_warnings =
        !orphans.is_empty() || !name_conflicts.is_empty() || !missing_down.is_empty();

    if json {
        let payload = json!({
            "status": if has_errors { "error" } else { "ok" },
            "total": files.len(),
            "duplicate_versions": duplicates.iter().map(|(v, paths)| {
                (v.clone(), paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>())
            }).collect::<std::collections::BTreeMap<_, _>>(),
            "orphaned_migrations": orphans.iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            "name_conflicts": name_conflicts,
            "missing_down": missing_down,
            "non_idempotent": non_idempotent,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        eprintln!("Validated {} migration file(s)", files.len());
        for (version, paths) in &duplicates {
            eprintln!("ERROR duplicate version {}:", version);
            for path in paths {
                eprintln!("    - {}", path.display());
            }
        }
        for orphan in &orphans {
            eprintln!(
                "WARNING orphaned file {} (not matching NNN_name.up.sql)",
                orphan.display()
            );
        }
        for (name, versions) in &name_conflicts {
            eprintln!(
                "WARNING name '{}' used by versions {}",
                name,
                versions.join(", ")
            );
        }
        for version in &missing_down {
            eprintln!("WARNING migration {} has no .down.sql", version);
        }
        for version in &non_idempotent {
            eprintln!(
                "INFO migration {} has CREATE statements without IF NOT EXISTS",
                version
            );
        }
        if !has_errors && !has_warnings {
            eprintln!("All clean.");
        }
    }

    if has_errors {
        std::process::exit(3);
    }
    if has_warnings {
        std::process::exit(1);
    }
    Ok(())
}

fn has_non_idempotent_ddl(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    for pattern in ["CREATE TABLE ", "CREATE INDEX ", "CREATE UNIQUE INDEX "] {
        let mut search_from = 0;
        while let Some(pos) = upper[search_from..].find(pattern) {
            let rest = &upper[search_from + pos + pattern.len()..];
            if !rest.trim_start().starts_with("IF NOT EXISTS") {
                return true;
            }
            search_from += pos + pattern.len();
        }
    }
    false
}

fn fix(migrations_dir: PathBuf, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let files = find_migration_files(&migrations_dir);
    let mut fixed = Vec::new();

    for file in &files {
        let sql = fs::read_to_string(&file.up_path)?;
        let rewritten = rewrite_idempotent(&sql);
        if rewritten != sql {
            if !dry_run {
                fs::write(&file.up_path, &rewritten)?;
            }
            fixed.push(file.version.clone());
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "ok",
                "fixed": fixed,
                "dry_run": dry_run,
            }))?
        );
    } else if fixed.is_empty() {
        eprintln!("Nothing to fix.");
    } else {
        let label = if dry_run { "Would rewrite" } else { "Rewrote" };
        eprintln!("{} {} file(s): {}", label, fixed.len(), fixed.join(", "));
    }

    Ok(())
}

/// Rewrite CREATE TABLE / CREATE INDEX statements to the IF NOT EXISTS form.
fn rewrite_idempotent(sql: &str) -> String {
    use once_cell::sync::Lazy;
    use regex::{Captures, Regex};

    static CREATE_TABLE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bCREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?").unwrap());
    static CREATE_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\bCREATE\s+(UNIQUE\s+)?INDEX\s+(CONCURRENTLY\s+)?(IF\s+NOT\s+EXISTS\s+)?")
            .unwrap()
    });

    let step1 = CREATE_TABLE_RE.replace_all(sql, |caps: &Captures| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            "CREATE TABLE IF NOT EXISTS ".to_string()
        }
    });
    CREATE_INDEX_RE
        .replace_all(&step1, |caps: &Captures| {
            if caps.get(3).is_some() {
                return caps[0].to_string();
            }
            let unique = if caps.get(1).is_some() { "UNIQUE " } else { "" };
            let concurrently = if caps.get(2).is_some() { "CONCURRENTLY " } else { "" };
            format!("CREATE {}INDEX {}IF NOT EXISTS ", unique, concurrently)
        })
        .into_owned()
}

#[allow(clippy::too_many_arguments)]
fn generate(
    name: String,
    migrations_dir: PathBuf,
    generator: Option<String>,
    from: Option<PathBuf>,
    to: Option<PathBuf>,
    env: String,
    project_dir: PathBuf,
    dry_run: bool,
    verbose: bool,
    json: bool,
) -> anyhow::Result<()> {
    let template_generator = MigrationGenerator::new(&migrations_dir);

    if verbose && !json {
        eprintln!("Scanning {} for existing versions...", migrations_dir.display());
    }

    match generator {
        None => {
            let result = template_generator.generate(&name, dry_run)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                // Soft warnings to stderr in text mode
                for (version, files) in &result.duplicate_versions {
                    eprintln!(
                        "Warning: duplicate version {} across {}",
                        version,
                        files.join(", ")
                    );
                }
                for (conflict_name, versions) in &result.name_conflicts {
                    eprintln!(
                        "Warning: name '{}' already used by versions {}",
                        conflict_name,
                        versions.join(", ")
                    );
                }
                if dry_run {
                    eprintln!(
                        "Would create {} and {}",
                        result.up_path.display(),
                        result.down_path.display()
                    );
                    if let Some(preview) = &result.preview {
                        eprintln!("--- preview ---\n{}", preview);
                    }
                } else {
                    eprintln!("Created {}", result.up_path.display());
                    eprintln!("Created {}", result.down_path.display());
                }
            }
        }
        Some(generator_name) => {
            let env_config = Environment::load(&env, &project_dir)?;
            let generator_config = env_config
                .migration
                .migration_generators
                .get(&generator_name)
                .ok_or_else(|| {
                    ConfitureError::Config(format!(
                        "Unknown migration generator '{}'. Configure it under \
                         migration.migration_generators",
                        generator_name
                    ))
                })?;
            let from = from.ok_or_else(|| {
                ConfitureError::Config("--from is required with --generator".to_string())
            })?;
            let to = to.ok_or_else(|| {
                ConfitureError::Config("--to is required with --generator".to_string())
            })?;

            // Allocate the version first (locked), then let the external
            // tool fill the up file in.
            let allocation = template_generator.generate(&name, dry_run)?;
            let external = ExternalGenerator::new(&generator_name, generator_config);
            let result = external.generate(
                &from,
                &to,
                &allocation.up_path,
                &allocation.down_path,
                dry_run,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if dry_run {
                eprintln!("Would run: {}", result.command);
            } else {
                eprintln!("Generated {}", result.up_path.display());
                if result.down_stub_written {
                    eprintln!("Wrote rollback stub {}", result.down_path.display());
                }
            }
        }
    }

    Ok(())
}

fn diff(
    old: PathBuf,
    new: Option<PathBuf>,
    live: bool,
    env: String,
    project_dir: PathBuf,
    format: String,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let old_schema = parse_sql(&fs::read_to_string(&old)?);

    let new_schema = if live {
        let env_config = Environment::load(&env, &project_dir)?;
        let mut db = connect(&env_config)?;
        Introspector::new(&mut db).introspect(None)?
    } else {
        let new_path = new.ok_or_else(|| {
            ConfitureError::Config("Provide a new-state DDL file or --live".to_string())
        })?;
        parse_sql(&fs::read_to_string(&new_path)?)
    };

    let result = differ::compare_schemas(&old_schema, &new_schema);

    let rendered = match format.as_str() {
        "text" => differ::render_text(&result),
        "sql" => differ::render_sql(&result),
        "json" => serde_json::to_string_pretty(&result)?,
        other => anyhow::bail!("Unknown format: {}. Use text, json, or sql", other),
    };

    match output {
        Some(path) => fs::write(&path, format!("{}\n", rendered))?,
        None => println!("{}", rendered),
    }

    if result.has_changes() {
        std::process::exit(1);
    }
    Ok(())
}

fn verify(
    env: String,
    project_dir: PathBuf,
    migrations_dir: PathBuf,
    fix: bool,
    json: bool,
) -> anyhow::Result<()> {
    let env_config = Environment::load(&env, &project_dir)?;
    let mut db = connect(&env_config)?;
    let mut migrator = Migrator::new(&mut db, &env_config.migration.tracking_table);
    migrator.initialize()?;
    let tracking = migrator.tracking().clone();

    let verifier = ChecksumVerifier::new(OnMismatch::Warn);

    if fix {
        eprintln!(
            "Warning: --fix overwrites stored checksums with current file hashes; the drift \
             record is erased."
        );
        let fixed = verifier.fix(&mut db, &tracking, &migrations_dir)?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "ok",
                    "fixed": fixed,
                }))?
            );
        } else if fixed.is_empty() {
            eprintln!("All checksums already match.");
        } else {
            for mismatch in &fixed {
                eprintln!("Updated {}", mismatch);
            }
        }
        return Ok(());
    }

    let mismatches = verifier.collect_mismatches(&mut db, &tracking, &migrations_dir)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": if mismatches.is_empty() { "ok" } else { "mismatch" },
                "mismatches": mismatches,
            }))?
        );
    } else if mismatches.is_empty() {
        eprintln!("All checksums match.");
    } else {
        for mismatch in &mismatches {
            eprintln!("Mismatch: {}", mismatch);
        }
    }

    if !mismatches.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_idempotent_create_table() {
        let sql = "CREATE TABLE tb_x (id INT);";
        assert_eq!(
            rewrite_idempotent(sql),
            "CREATE TABLE IF NOT EXISTS tb_x (id INT);"
        );
    }

    #[test]
    fn test_rewrite_leaves_existing_guards() {
        let sql = "CREATE TABLE IF NOT EXISTS tb_x (id INT);";
        assert_eq!(rewrite_idempotent(sql), sql);
    }

    #[test]
    fn test_rewrite_unique_index() {
        let sql = "CREATE UNIQUE INDEX idx_x ON t (c);";
        assert_eq!(
            rewrite_idempotent(sql),
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_x ON t (c);"
        );
    }

    #[test]
    fn test_non_idempotent_detection() {
        assert!(has_non_idempotent_ddl("CREATE TABLE t (id INT);"));
        assert!(!has_non_idempotent_ddl("CREATE TABLE IF NOT EXISTS t (id INT);"));
        assert!(!has_non_idempotent_ddl("ALTER TABLE t ADD COLUMN x INT;"));
    }
}
