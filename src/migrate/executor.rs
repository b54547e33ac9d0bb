//! Migration executor: apply, rollback, and the state-rewriting flows
//! (baseline, reinit, rebuild).
//!
//! Every apply runs inside a savepoint named `migration_{version}` so a
//! failing migration never pollutes the schema. Hook phases run in declared
//! order around the DDL; ON_ERROR hooks run after rollback and are logged,
//! never raised.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ConfitureError;
use crate::migrate::checksum::{compute_checksum, ChecksumVerifier, OnMismatch};
use crate::migrate::hooks::{Direction, HookContext, HookExecutor, HookPhase};
use crate::migrate::tracking::{MarkReason, TrackingTable};
use crate::migrate::{
    ensure_no_duplicate_versions, find_migration_files, find_orphan_sql_files, Db, Migration,
    MigrationFile,
};
use crate::schema::split_statements;
use crate::seed::applier::{SeedApplier, SeedApplyResult};

/// Result of a `reinit` run.
#[derive(Debug, Serialize)]
pub struct ReinitResult {
    pub deleted_count: u64,
    pub migrations_marked: Vec<String>,
    pub dry_run: bool,
}

/// Result of a `baseline` run.
#[derive(Debug, Serialize)]
pub struct BaselineResult {
    pub migrations_marked: Vec<String>,
    pub skipped_already_applied: Vec<String>,
    pub dry_run: bool,
}

/// Options for a `rebuild` run.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub drop_schemas: bool,
    pub apply_seeds: bool,
    pub backup_tracking: bool,
    pub dry_run: bool,
    pub migrations_dir: PathBuf,
    pub seeds_dir: Option<PathBuf>,
}

/// Result of a `rebuild` run.
#[derive(Debug, Serialize)]
pub struct RebuildResult {
    pub schemas_dropped: Vec<String>,
    pub statements_applied: usize,
    pub warnings: Vec<String>,
    pub migrations_marked: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<SeedApplyResult>,
    pub dry_run: bool,
}

/// Executes migrations and maintains tracking state.
pub struct Migrator<'a> {
    db: &'a mut Db,
    tracking: TrackingTable,
    hook_executor: HookExecutor,
    /// Verify stored checksums before `migrate up`
    pub verify_checksums: bool,
    pub on_mismatch: OnMismatch,
}

impl<'a> Migrator<'a> {
    pub fn new(db: &'a mut Db, tracking_table: &str) -> Self {
        Self {
            db,
            tracking: TrackingTable::new(tracking_table),
            hook_executor: HookExecutor::new(),
            verify_checksums: false,
            on_mismatch: OnMismatch::Fail,
        }
    }

    pub fn tracking(&self) -> &TrackingTable {
        &self.tracking
    }

    /// Create or upgrade the tracking table. Idempotent.
    pub fn initialize(&mut self) -> Result<(), ConfitureError> {
        self.tracking.initialize(self.db)
    }

    /// Apply a migration inside a savepoint, running hook phases around the
    /// DDL and recording the result.
    ///
    /// With `force`, an already-applied migration is re-run but never
    /// re-recorded.
    pub fn apply(&mut self, migration: &Migration, force: bool) -> Result<(), ConfitureError> {
        let already_applied = self.tracking.is_applied(self.db, &migration.version)?;
        if already_applied && !force {
            return Err(ConfitureError::MigrationAlreadyApplied {
                version: migration.version.clone(),
                name: migration.name.clone(),
            });
        }

        let savepoint = format!("migration_{}", migration.version);
        let context = HookContext {
            migration_version: migration.version.clone(),
            migration_name: migration.name.clone(),
            direction: Direction::Forward,
        };

        self.db.begin()?;
        self.db.create_savepoint(&savepoint)?;

        let result = self.apply_inner(migration, already_applied, &context);

        match result {
            Ok(()) => {
                self.db.release_savepoint(&savepoint)?;
                self.db.commit()?;
                info!(
                    version = %migration.version,
                    name = %migration.name,
                    "applied migration"
                );
                Ok(())
            }
            Err(e) => {
                self.db.rollback_to_savepoint(&savepoint);
                let _ = self.db.commit();

                debug!(version = %migration.version, "migration failed, running ON_ERROR hooks");
                self.hook_executor
                    .execute_on_error(self.db, &migration.hooks, &context);

                match e {
                    e @ (ConfitureError::Migration { .. }
                    | ConfitureError::MigrationAlreadyApplied { .. }) => Err(e),
                    other => Err(ConfitureError::migration_for(
                        format!(
                            "Failed to apply migration {} ({}): {}",
                            migration.version, migration.name, other
                        ),
                        &migration.version,
                        &migration.name,
                    )),
                }
            }
        }
    }

    fn apply_inner(
        &mut self,
        migration: &Migration,
        already_applied: bool,
        context: &HookContext,
    ) -> Result<(), ConfitureError> {
        let hooks = &migration.hooks;

        debug!(version = %migration.version, "BEFORE_VALIDATION hooks");
        self.hook_executor
            .execute_phase(self.db, HookPhase::BeforeValidation, hooks, context)?;

        debug!(version = %migration.version, "BEFORE_DDL hooks");
        self.hook_executor
            .execute_phase(self.db, HookPhase::BeforeDdl, hooks, context)?;

        debug!(version = %migration.version, "executing DDL");
        let start = Instant::now();
        self.db.execute(&migration.up_sql)?;
        let execution_time_ms = start.elapsed().as_millis() as i32;

        debug!(version = %migration.version, "AFTER_DDL hooks");
        self.hook_executor
            .execute_phase(self.db, HookPhase::AfterDdl, hooks, context)?;

        debug!(version = %migration.version, "AFTER_VALIDATION hooks");
        self.hook_executor
            .execute_phase(self.db, HookPhase::AfterValidation, hooks, context)?;

        debug!(version = %migration.version, "CLEANUP hooks");
        self.hook_executor
            .execute_phase(self.db, HookPhase::Cleanup, hooks, context)?;

        if !already_applied {
            let checksum = match &migration.source_path {
                Some(path) => Some(compute_checksum(path)?),
                None => None,
            };
            self.tracking.record(
                self.db,
                &migration.version,
                &migration.name,
                execution_time_ms,
                checksum.as_deref(),
            )?;
        }

        Ok(())
    }

    /// Roll back a migration and remove its tracking row.
    pub fn rollback(&mut self, migration: &Migration) -> Result<(), ConfitureError> {
        if !self.tracking.is_applied(self.db, &migration.version)? {
            return Err(ConfitureError::MigrationNotApplied {
                version: migration.version.clone(),
                name: migration.name.clone(),
            });
        }

        let down_sql = migration.down_sql.as_ref().ok_or_else(|| {
            ConfitureError::Rollback(format!(
                "Migration {} ({}) has no down migration",
                migration.version, migration.name
            ))
        })?;

        let context = HookContext {
            migration_version: migration.version.clone(),
            migration_name: migration.name.clone(),
            direction: Direction::Backward,
        };

        self.db.begin()?;
        let result = (|| -> Result<(), ConfitureError> {
            self.hook_executor.execute_phase(
                self.db,
                HookPhase::BeforeDdl,
                &migration.hooks,
                &context,
            )?;

            debug!(version = %migration.version, "executing rollback DDL");
            self.db.execute(down_sql)?;

            self.hook_executor.execute_phase(
                self.db,
                HookPhase::Cleanup,
                &migration.hooks,
                &context,
            )?;

            self.tracking.delete(self.db, &migration.version)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.db.commit()?;
                info!(
                    version = %migration.version,
                    name = %migration.name,
                    "rolled back migration"
                );
                Ok(())
            }
            Err(e) => {
                let _ = self.db.rollback();
                debug!(version = %migration.version, "rollback failed, running ON_ERROR hooks");
                self.hook_executor
                    .execute_on_error(self.db, &migration.hooks, &context);
                Err(ConfitureError::Rollback(format!(
                    "Failed to rollback migration {} ({}): {}",
                    migration.version, migration.name, e
                )))
            }
        }
    }

    pub fn get_applied_versions(&mut self) -> Result<Vec<String>, ConfitureError> {
        self.tracking.applied_versions(self.db)
    }

    /// Migration files not yet recorded as applied.
    pub fn find_pending(
        &mut self,
        migrations_dir: &Path,
    ) -> Result<Vec<MigrationFile>, ConfitureError> {
        let applied: ahash::AHashSet<String> =
            self.get_applied_versions()?.into_iter().collect();
        Ok(find_migration_files(migrations_dir)
            .into_iter()
            .filter(|f| !applied.contains(&f.version))
            .collect())
    }

    /// Apply all pending migrations (or up to `target`), strictly in
    /// ascending version order. A failure aborts the run.
    pub fn migrate_up(
        &mut self,
        migrations_dir: &Path,
        target: Option<&str>,
        force: bool,
        strict_mode: bool,
    ) -> Result<Vec<String>, ConfitureError> {
        ensure_no_duplicate_versions(migrations_dir)?;

        let orphans = find_orphan_sql_files(migrations_dir);
        if strict_mode && !orphans.is_empty() {
            let names: Vec<String> = orphans
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
                .collect();
            return Err(ConfitureError::migration(format!(
                "Orphaned SQL files present under migrations (strict mode): {}",
                names.join(", ")
            )));
        } else if !orphans.is_empty() {
            warn!("{} orphaned SQL file(s) under migrations ignored", orphans.len());
        }

        if self.verify_checksums {
            let verifier = ChecksumVerifier::new(self.on_mismatch);
            verifier.verify(self.db, &self.tracking, migrations_dir)?;
        }

        let files = if force {
            find_migration_files(migrations_dir)
        } else {
            self.find_pending(migrations_dir)?
        };

        let mut applied = Vec::new();
        for file in files {
            if let Some(target) = target {
                if file.version.as_str() > target {
                    break;
                }
            }
            let migration = file.load()?;
            self.apply(&migration, force)?;
            applied.push(migration.version);
        }

        Ok(applied)
    }

    /// Roll back the most recent `steps` migrations, newest first.
    pub fn migrate_down(
        &mut self,
        migrations_dir: &Path,
        steps: usize,
    ) -> Result<Vec<String>, ConfitureError> {
        ensure_no_duplicate_versions(migrations_dir)?;

        let files = find_migration_files(migrations_dir);
        let applied = self.tracking.applied_versions_desc(self.db)?;

        let mut rolled_back = Vec::new();
        for version in applied.into_iter().take(steps) {
            let file = files.iter().find(|f| f.version == version).ok_or_else(|| {
                ConfitureError::Rollback(format!(
                    "Applied migration {} has no file on disk",
                    version
                ))
            })?;
            let migration = file.load()?;
            self.rollback(&migration)?;
            rolled_back.push(version);
        }

        Ok(rolled_back)
    }

    /// Insert a tracking row for a file without executing its DDL.
    pub fn mark_applied(
        &mut self,
        file: &MigrationFile,
        reason: MarkReason,
    ) -> Result<(), ConfitureError> {
        self.tracking.mark(self.db, &file.version, &file.name, reason)
    }

    /// Clear the tracking table and re-mark files up to `through`.
    /// Atomic unless `dry_run`.
    pub fn reinit(
        &mut self,
        migrations_dir: &Path,
        through: Option<&str>,
        dry_run: bool,
    ) -> Result<ReinitResult, ConfitureError> {
        ensure_no_duplicate_versions(migrations_dir)?;

        let files: Vec<MigrationFile> = find_migration_files(migrations_dir)
            .into_iter()
            .filter(|f| through.map(|t| f.version.as_str() <= t).unwrap_or(true))
            .collect();
        let marked: Vec<String> = files.iter().map(|f| f.version.clone()).collect();

        if dry_run {
            let current = self.tracking.count(self.db)? as u64;
            return Ok(ReinitResult {
                deleted_count: current,
                migrations_marked: marked,
                dry_run: true,
            });
        }

        self.db.begin()?;
        let result = (|| -> Result<u64, ConfitureError> {
            let deleted = self.tracking.clear(self.db)?;
            for file in &files {
                self.tracking
                    .mark(self.db, &file.version, &file.name, MarkReason::Reinit)?;
            }
            Ok(deleted)
        })();

        match result {
            Ok(deleted_count) => {
                self.db.commit()?;
                info!(deleted = deleted_count, marked = marked.len(), "reinit complete");
                Ok(ReinitResult {
                    deleted_count,
                    migrations_marked: marked,
                    dry_run: false,
                })
            }
            Err(e) => {
                let _ = self.db.rollback();
                Err(e)
            }
        }
    }

    /// Mark files up to `through` as applied without clearing the table.
    pub fn baseline(
        &mut self,
        migrations_dir: &Path,
        through: &str,
        dry_run: bool,
    ) -> Result<BaselineResult, ConfitureError> {
        ensure_no_duplicate_versions(migrations_dir)?;

        let files: Vec<MigrationFile> = find_migration_files(migrations_dir)
            .into_iter()
            .filter(|f| f.version.as_str() <= through)
            .collect();

        let mut marked = Vec::new();
        let mut skipped = Vec::new();

        for file in &files {
            if self.tracking.is_applied(self.db, &file.version)? {
                skipped.push(file.version.clone());
                continue;
            }
            if !dry_run {
                self.tracking
                    .mark(self.db, &file.version, &file.name, MarkReason::Baseline)?;
            }
            marked.push(file.version.clone());
        }

        Ok(BaselineResult {
            migrations_marked: marked,
            skipped_already_applied: skipped,
            dry_run,
        })
    }

    /// The nuclear option: drop user schemas, re-apply the built DDL,
    /// re-initialise tracking, re-mark file state, optionally apply seeds.
    ///
    /// Schema drops require autocommit, so this flow is only transactional
    /// where PostgreSQL permits.
    pub fn rebuild(
        &mut self,
        ddl: &str,
        options: &RebuildOptions,
    ) -> Result<RebuildResult, ConfitureError> {
        ensure_no_duplicate_versions(&options.migrations_dir)?;

        let user_schemas = self.list_user_schemas()?;
        let files = find_migration_files(&options.migrations_dir);
        let marked: Vec<String> = files.iter().map(|f| f.version.clone()).collect();
        let statements: Vec<String> = split_statements(ddl)
            .into_iter()
            .filter(|s| {
                let word = s.trim().to_uppercase();
                word != "BEGIN" && word != "COMMIT"
            })
            .collect();

        if options.dry_run {
            return Ok(RebuildResult {
                schemas_dropped: if options.drop_schemas { user_schemas } else { Vec::new() },
                statements_applied: statements.len(),
                warnings: Vec::new(),
                migrations_marked: marked,
                tracking_backup: None,
                seeds: None,
                dry_run: true,
            });
        }

        let mut warnings = Vec::new();

        let tracking_backup = if options.backup_tracking && self.tracking.exists(self.db)? {
            Some(self.tracking.backup(self.db)?)
        } else {
            None
        };

        let mut schemas_dropped = Vec::new();
        if options.drop_schemas {
            for schema in &user_schemas {
                self.db
                    .execute(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema))?;
                schemas_dropped.push(schema.clone());
            }
            // public always comes back, even if it was not dropped above
            self.db.execute("CREATE SCHEMA IF NOT EXISTS public")?;
        }

        let mut statements_applied = 0;
        for statement in &statements {
            match self.db.execute(statement) {
                Ok(()) => statements_applied += 1,
                Err(e) => {
                    let head = statement.trim_start().to_uppercase();
                    if head.starts_with("CREATE EXTENSION") {
                        warnings.push(format!("extension statement failed: {}", e));
                        continue;
                    }
                    return Err(ConfitureError::Rebuild(format!(
                        "Rebuild failed applying DDL: {}",
                        e
                    )));
                }
            }
        }

        self.initialize()?;

        self.db.begin()?;
        let mark_result = (|| -> Result<(), ConfitureError> {
            self.tracking.clear(self.db)?;
            for file in &files {
                self.tracking
                    .mark(self.db, &file.version, &file.name, MarkReason::Reinit)?;
            }
            Ok(())
        })();
        match mark_result {
            Ok(()) => self.db.commit()?,
            Err(e) => {
                let _ = self.db.rollback();
                return Err(e);
            }
        }

        let seeds = match (&options.seeds_dir, options.apply_seeds) {
            (Some(dir), true) => {
                let applier = SeedApplier::new(dir.clone());
                Some(applier.apply_sequential(self.db, false)?)
            }
            _ => None,
        };

        info!(
            schemas = schemas_dropped.len(),
            statements = statements_applied,
            "rebuild complete"
        );

        Ok(RebuildResult {
            schemas_dropped,
            statements_applied,
            warnings,
            migrations_marked: marked,
            tracking_backup,
            seeds,
            dry_run: false,
        })
    }

    /// User schemas eligible for dropping during rebuild.
    fn list_user_schemas(&mut self) -> Result<Vec<String>, ConfitureError> {
        let rows = self.db.query(
            "SELECT nspname FROM pg_namespace
             WHERE nspname NOT LIKE 'pg\\_%'
               AND nspname <> 'information_schema'
             ORDER BY nspname",
            &[],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}
