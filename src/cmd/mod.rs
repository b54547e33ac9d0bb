mod build;
mod introspect;
mod lint;
mod migrate;
mod restore;
mod seed;

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Build the schema from DDL files:
    confiture build --env local -o schema.sql

  Apply pending migrations:
    confiture migrate up --env production

  Validate seed data before applying:
    confiture seed validate --level 3 --env local

  Restore a dump in three phases with 8 workers:
    confiture restore prod.pgdump --db staging -j 8 --parallel

\x1b[1mMore info:\x1b[0m
  Run 'confiture <command> --help' for command-specific options.
  Enable completions: confiture completions <shell>";

#[derive(Parser)]
#[command(name = "confiture")]
#[command(version)]
#[command(about = "PostgreSQL schema build and migration engine")]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

// Help heading constants for consistency
const INPUT_OUTPUT: &str = "Input/Output";
const BEHAVIOR: &str = "Behavior";
const OUTPUT_FORMAT: &str = "Output";
const CONNECTION: &str = "Connection";
const SAFETY: &str = "Safety";

#[derive(Subcommand)]
pub enum Commands {
    /// Build the schema by concatenating DDL files in deterministic order
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  confiture build --env local
  confiture build --env local --schema-only -o db/schema.sql
  confiture build --env local --separator-style line_comment")]
    Build {
        /// Environment name
        #[arg(short, long, default_value = "local", help_heading = INPUT_OUTPUT)]
        env: String,

        /// Project root containing db/environments/
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Exclude seed files from the build
        #[arg(long, help_heading = BEHAVIOR)]
        schema_only: bool,

        /// Write the built schema to a file
        #[arg(short, long, value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        output: Option<PathBuf>,

        /// Override comment validation (true/false)
        #[arg(long, help_heading = BEHAVIOR)]
        validate_comments: Option<bool>,

        /// Override fail-on-unclosed-blocks (true/false)
        #[arg(long, help_heading = BEHAVIOR)]
        fail_on_unclosed: Option<bool>,

        /// Separator style: block_comment, line_comment, mysql, custom
        #[arg(long, help_heading = BEHAVIOR)]
        separator_style: Option<String>,

        /// Show progress bar
        #[arg(short, long, help_heading = OUTPUT_FORMAT)]
        progress: bool,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Lint the built schema against structural rules
    Lint {
        /// Environment name
        #[arg(short, long, default_value = "local", help_heading = INPUT_OUTPUT)]
        env: String,

        /// Project root containing db/environments/
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Comma-separated rule keys to run (default: all)
        #[arg(long, help_heading = BEHAVIOR)]
        rules: Option<String>,

        /// Comma-separated tables to skip
        #[arg(long, help_heading = BEHAVIOR)]
        exclude_tables: Option<String>,

        /// Treat warnings as failures
        #[arg(long, help_heading = BEHAVIOR)]
        fail_on_warning: bool,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Migration state management
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// Seed data validation, application, and conversion
    Seed {
        #[command(subcommand)]
        command: SeedCommands,
    },

    /// Three-phase pg_restore (pre-data, data, post-data)
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  confiture restore prod.pgdump --db staging -j 8 --parallel
  confiture restore dumps/nightly --db staging --min-tables 300")]
    Restore {
        /// Dump path: custom-format file or directory-format directory
        #[arg(value_hint = ValueHint::AnyPath, help_heading = INPUT_OUTPUT)]
        backup_path: PathBuf,

        /// Target database name
        #[arg(long = "db", help_heading = CONNECTION)]
        target_db: String,

        /// Host or socket directory
        #[arg(long, default_value = "/var/run/postgresql", help_heading = CONNECTION)]
        host: String,

        #[arg(long, default_value_t = 5432, help_heading = CONNECTION)]
        port: u16,

        /// Role to connect as
        #[arg(short = 'U', long, help_heading = CONNECTION)]
        username: Option<String>,

        /// Parallel workers for the data phase
        #[arg(short, long, default_value_t = 4, help_heading = BEHAVIOR)]
        jobs: u32,

        /// Skip ownership restoration (--no-owner)
        #[arg(long, help_heading = BEHAVIOR)]
        no_owner: bool,

        /// Skip privilege restoration (--no-acl)
        #[arg(long, help_heading = BEHAVIOR)]
        no_acl: bool,

        /// Do not abort on the first error
        #[arg(long, help_heading = BEHAVIOR)]
        no_exit_on_error: bool,

        /// Run pg_restore via sudo -u <superuser>
        #[arg(long, help_heading = CONNECTION)]
        superuser: Option<String>,

        /// Treat transient FK errors in the data phase as noise
        #[arg(long = "parallel", help_heading = BEHAVIOR)]
        parallel_restore: bool,

        /// Verify at least this many tables exist after restore
        #[arg(long, default_value_t = 0, help_heading = SAFETY)]
        min_tables: u32,

        /// Schema for the table-count check
        #[arg(long, default_value = "public", help_heading = SAFETY)]
        min_tables_schema: String,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Read the live schema out of the database catalogs
    Introspect {
        /// Environment name (for the database URL)
        #[arg(short, long, help_heading = CONNECTION)]
        env: Option<String>,

        /// Project root containing db/environments/
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Database URL (overrides the environment config)
        #[arg(long, help_heading = CONNECTION)]
        database_url: Option<String>,

        /// Comma-separated schemas to read (default: public)
        #[arg(long, help_heading = BEHAVIOR)]
        schemas: Option<String>,

        /// Output format: yaml or json
        #[arg(short, long, default_value = "yaml", help_heading = OUTPUT_FORMAT)]
        format: String,

        /// Save output to a file
        #[arg(short, long, value_hint = ValueHint::FilePath, help_heading = OUTPUT_FORMAT)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Apply pending migrations in ascending version order
    Up {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Migrations directory
        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Stop after this version
        #[arg(long, help_heading = BEHAVIOR)]
        target: Option<String>,

        /// Re-apply migrations regardless of state (never re-records)
        #[arg(long, help_heading = SAFETY)]
        force: bool,

        /// Fail on orphaned SQL files and warnings
        #[arg(long, help_heading = SAFETY)]
        strict: bool,

        /// Verify stored checksums before applying
        #[arg(long, help_heading = SAFETY)]
        verify_checksums: bool,

        /// Mismatch policy: fail, warn, ignore
        #[arg(long, default_value = "fail", help_heading = SAFETY)]
        on_checksum_mismatch: String,

        /// Disable the distributed migration lock (DANGEROUS in multi-pod)
        #[arg(long, help_heading = SAFETY)]
        no_lock: bool,

        /// Lock acquisition timeout in milliseconds
        #[arg(long, help_heading = SAFETY)]
        lock_timeout: Option<u64>,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Roll back the most recently applied migrations
    Down {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// How many migrations to roll back
        #[arg(long, default_value_t = 1, help_heading = BEHAVIOR)]
        steps: usize,

        #[arg(long, help_heading = SAFETY)]
        no_lock: bool,

        #[arg(long, help_heading = SAFETY)]
        lock_timeout: Option<u64>,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Show migration status (exit 0 = up to date, 1 = pending,
    /// 2 = tracking table absent, 3 = fatal)
    Status {
        /// Environment name; omit to list files without database state
        #[arg(short, long, help_heading = CONNECTION)]
        env: Option<String>,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Output format: table or json
        #[arg(short, long, default_value = "table", help_heading = OUTPUT_FORMAT)]
        format: String,
    },

    /// Mark migrations as applied without executing them
    Baseline {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Mark all versions up to and including this one
        #[arg(long, help_heading = BEHAVIOR)]
        through: Option<String>,

        /// Detect the baseline from schema-history snapshots
        #[arg(long, conflicts_with = "through", help_heading = BEHAVIOR)]
        detect: bool,

        #[arg(long, help_heading = SAFETY)]
        dry_run: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Clear the tracking table and re-mark file state
    Reinit {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Re-mark only versions up to and including this one
        #[arg(long, help_heading = BEHAVIOR)]
        through: Option<String>,

        #[arg(long, help_heading = SAFETY)]
        dry_run: bool,

        /// Confirm the destructive tracking-table clear
        #[arg(long, help_heading = SAFETY)]
        yes: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Drop user schemas, re-apply DDL, re-initialise tracking
    Rebuild {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Apply seeds after the rebuild
        #[arg(long, help_heading = BEHAVIOR)]
        apply_seeds: bool,

        /// Seeds directory (with --apply-seeds)
        #[arg(long, default_value = "db/seeds", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        seeds_dir: PathBuf,

        /// Keep existing schemas (only re-apply DDL)
        #[arg(long, help_heading = SAFETY)]
        no_drop_schemas: bool,

        /// Skip the tracking-table backup
        #[arg(long, help_heading = SAFETY)]
        no_backup: bool,

        #[arg(long, help_heading = SAFETY)]
        dry_run: bool,

        /// Confirm the destructive rebuild
        #[arg(long, help_heading = SAFETY)]
        yes: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Validate migration files (duplicates, orphans, missing rollbacks)
    Validate {
        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Rewrite migration DDL to its idempotent form
    Fix {
        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        #[arg(long, help_heading = SAFETY)]
        dry_run: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Generate the next migration (blank template or external generator)
    Generate {
        /// snake_case migration name
        name: String,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Named external generator from the environment config
        #[arg(long, help_heading = BEHAVIOR)]
        generator: Option<String>,

        /// Old-state DDL snapshot (with --generator)
        #[arg(long, value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        from: Option<PathBuf>,

        /// New-state DDL snapshot (with --generator)
        #[arg(long, value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        to: Option<PathBuf>,

        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, help_heading = SAFETY)]
        dry_run: bool,

        #[arg(short, long, help_heading = OUTPUT_FORMAT)]
        verbose: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Compare two DDL snapshots (or a snapshot against the live database)
    Diff {
        /// Old-state DDL file
        #[arg(value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        old: PathBuf,

        /// New-state DDL file; omit with --live
        #[arg(value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        new: Option<PathBuf>,

        /// Compare against the live database instead of a file
        #[arg(long, conflicts_with = "new", help_heading = CONNECTION)]
        live: bool,

        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Output format: text, json, sql
        #[arg(short, long, default_value = "text", help_heading = OUTPUT_FORMAT)]
        format: String,

        #[arg(short, long, value_hint = ValueHint::FilePath, help_heading = OUTPUT_FORMAT)]
        output: Option<PathBuf>,
    },

    /// Verify stored migration checksums against files on disk
    Verify {
        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        #[arg(long, default_value = "db/migrations", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        migrations_dir: PathBuf,

        /// Overwrite stored checksums with current file hashes (DANGEROUS)
        #[arg(long, help_heading = SAFETY)]
        fix: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SeedCommands {
    /// Run the multi-level seed validation orchestrator
    Validate {
        /// Seeds directory
        #[arg(long, default_value = "db/seeds", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        seeds_dir: PathBuf,

        /// Schema DDL tree (required for levels 2+)
        #[arg(long, value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        schema_dir: Option<PathBuf>,

        /// Highest validation level to run (1-5)
        #[arg(short, long, default_value_t = 3, help_heading = BEHAVIOR)]
        level: u8,

        /// Environment name (for the database URL, levels 4+)
        #[arg(short, long, help_heading = CONNECTION)]
        env: Option<String>,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Database URL (overrides the environment config)
        #[arg(long, help_heading = CONNECTION)]
        database_url: Option<String>,

        /// Keep running levels after critical errors
        #[arg(long, help_heading = BEHAVIOR)]
        no_stop_on_critical: bool,

        /// Second seed tree to compare against (order-independent)
        #[arg(long, value_hint = ValueHint::DirPath, help_heading = BEHAVIOR)]
        compare_seeds_dir: Option<PathBuf>,

        /// Output format: text, json, csv
        #[arg(short, long, default_value = "text", help_heading = OUTPUT_FORMAT)]
        format: String,
    },

    /// Apply seed files to the database
    Apply {
        #[arg(long, default_value = "db/seeds", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        seeds_dir: PathBuf,

        #[arg(short, long, default_value = "local", help_heading = CONNECTION)]
        env: String,

        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        project_dir: PathBuf,

        /// Database URL (overrides the environment config)
        #[arg(long, help_heading = CONNECTION)]
        database_url: Option<String>,

        /// Apply each file in its own savepoint (bypasses parser limits)
        #[arg(long, help_heading = BEHAVIOR)]
        sequential: bool,

        /// Keep applying remaining files after a failure
        #[arg(long, help_heading = BEHAVIOR)]
        continue_on_error: bool,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Analyse INSERT seed files for COPY convertibility (and convert)
    Convert {
        #[arg(long, default_value = "db/seeds", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        seeds_dir: PathBuf,

        /// Only report convertibility; write nothing
        #[arg(long, help_heading = BEHAVIOR)]
        check: bool,

        /// Directory for converted .copy.sql files
        #[arg(short, long, value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        output: Option<PathBuf>,

        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            env,
            project_dir,
            schema_only,
            output,
            validate_comments,
            fail_on_unclosed,
            separator_style,
            progress,
            json,
        } => build::run(
            env,
            project_dir,
            schema_only,
            output,
            validate_comments,
            fail_on_unclosed,
            separator_style,
            progress,
            json,
        ),
        Commands::Lint {
            env,
            project_dir,
            rules,
            exclude_tables,
            fail_on_warning,
            json,
        } => lint::run(env, project_dir, rules, exclude_tables, fail_on_warning, json),
        Commands::Migrate { command } => migrate::run(command),
        Commands::Seed { command } => seed::run(command),
        Commands::Restore {
            backup_path,
            target_db,
            host,
            port,
            username,
            jobs,
            no_owner,
            no_acl,
            no_exit_on_error,
            superuser,
            parallel_restore,
            min_tables,
            min_tables_schema,
            json,
        } => restore::run(
            backup_path,
            target_db,
            host,
            port,
            username,
            jobs,
            no_owner,
            no_acl,
            no_exit_on_error,
            superuser,
            parallel_restore,
            min_tables,
            min_tables_schema,
            json,
        ),
        Commands::Introspect {
            env,
            project_dir,
            database_url,
            schemas,
            format,
            output,
        } => introspect::run(env, project_dir, database_url, schemas, format, output),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Split a comma-separated CLI value into trimmed entries.
pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
