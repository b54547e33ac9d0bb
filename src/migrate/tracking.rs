//! Tracking table lifecycle and queries.
//!
//! The tracking table records every applied migration with the identity
//! trinity: auto-increment `id`, stable `pk_migration` UUID, and a
//! human-readable `slug`. A legacy table (no `pk_migration`) is upgraded
//! in place by `initialize`.

use chrono::Local;
use tracing::info;

use crate::error::ConfitureError;
use crate::migrate::Db;

/// How a tracking row was inserted without executing DDL. The suffix on the
/// slug is the only durable record of the pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReason {
    Baseline,
    Reinit,
}

impl MarkReason {
    pub fn slug_suffix(&self) -> &'static str {
        match self {
            MarkReason::Baseline => "_baseline",
            MarkReason::Reinit => "_reinit",
        }
    }
}

/// The tracking table, optionally schema-qualified.
#[derive(Debug, Clone)]
pub struct TrackingTable {
    qualified: String,
    schema: Option<String>,
    table: String,
}

impl TrackingTable {
    /// Parse a configured name such as `tb_confiture` or `public.tb_confiture`.
    pub fn new(configured_name: &str) -> Self {
        match configured_name.split_once('.') {
            Some((schema, table)) => Self {
                qualified: configured_name.to_string(),
                schema: Some(schema.to_string()),
                table: table.to_string(),
            },
            None => Self {
                qualified: configured_name.to_string(),
                schema: None,
                table: configured_name.to_string(),
            },
        }
    }

    /// Fully-qualified name for SQL statements.
    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    /// Bare table name (for catalog lookups and index names).
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Does the table exist in the target database?
    pub fn exists(&self, db: &mut Db) -> Result<bool, ConfitureError> {
        let row = match &self.schema {
            Some(schema) => db.query_one(
                "SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[schema, &self.table],
            )?,
            None => db.query_one(
                "SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_name = $1
                )",
                &[&self.table],
            )?,
        };
        Ok(row.get(0))
    }

    fn has_column(&self, db: &mut Db, column: &str) -> Result<bool, ConfitureError> {
        let row = db.query_one(
            "SELECT EXISTS (
                SELECT FROM information_schema.columns
                WHERE table_name = $1 AND column_name = $2
            )",
            &[&self.table, &column.to_string()],
        )?;
        Ok(row.get(0))
    }

    /// Create the tracking table, or upgrade a legacy one in place.
    /// Idempotent.
    pub fn initialize(&self, db: &mut Db) -> Result<(), ConfitureError> {
        db.execute("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\"")
            .map_err(|e| {
                ConfitureError::migration(format!(
                    "Failed to initialize migrations table: {}",
                    e
                ))
            })?;

        let result = if self.exists(db)? {
            self.upgrade_legacy(db)
        } else {
            self.create(db)
        };

        result.map_err(|e| {
            ConfitureError::migration(format!("Failed to initialize migrations table: {}", e))
        })
    }

    fn create(&self, db: &mut Db) -> Result<(), ConfitureError> {
        let name = &self.qualified;
        db.execute(&format!(
            "CREATE TABLE {} (
                id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                pk_migration UUID NOT NULL DEFAULT uuid_generate_v4() UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                version VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                execution_time_ms INTEGER,
                checksum VARCHAR(64)
            )",
            name
        ))?;

        let index_base = self.table.replace('.', "_");
        db.execute(&format!(
            "CREATE INDEX idx_{}_pk_migration ON {} (pk_migration)",
            index_base, name
        ))?;
        db.execute(&format!(
            "CREATE INDEX idx_{}_slug ON {} (slug)",
            index_base, name
        ))?;
        db.execute(&format!(
            "CREATE INDEX idx_{}_version ON {} (version)",
            index_base, name
        ))?;
        db.execute(&format!(
            "CREATE INDEX idx_{}_applied_at ON {} (applied_at DESC)",
            index_base, name
        ))?;
        Ok(())
    }

    /// Upgrade an old-structure table to the identity trinity.
    fn upgrade_legacy(&self, db: &mut Db) -> Result<(), ConfitureError> {
        if self.has_column(db, "pk_migration")? {
            return Ok(());
        }

        info!(table = %self.qualified, "upgrading legacy tracking table");
        let name = &self.qualified;

        db.execute(&format!(
            "ALTER TABLE {}
                ADD COLUMN pk_migration UUID DEFAULT uuid_generate_v4() UNIQUE,
                ADD COLUMN slug TEXT,
                ALTER COLUMN id SET DATA TYPE BIGINT,
                ALTER COLUMN applied_at SET DATA TYPE TIMESTAMPTZ",
            name
        ))?;

        db.execute(&format!(
            "UPDATE {}
             SET slug = name || '_' || to_char(applied_at, 'YYYYMMDD_HH24MISS')
             WHERE slug IS NULL",
            name
        ))?;

        let index_base = self.table.replace('.', "_");
        db.execute(&format!(
            "ALTER TABLE {}
                ALTER COLUMN slug SET NOT NULL,
                ADD CONSTRAINT {}_slug_unique UNIQUE (slug)",
            name, index_base
        ))?;

        db.execute(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_pk_migration ON {} (pk_migration)",
            index_base, name
        ))?;
        db.execute(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_slug ON {} (slug)",
            index_base, name
        ))?;
        Ok(())
    }

    pub fn is_applied(&self, db: &mut Db, version: &str) -> Result<bool, ConfitureError> {
        let row = db.query_one(
            &format!("SELECT COUNT(*) FROM {} WHERE version = $1", self.qualified),
            &[&version.to_string()],
        )?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    /// Applied versions, ordered by applied_at ascending.
    pub fn applied_versions(&self, db: &mut Db) -> Result<Vec<String>, ConfitureError> {
        let rows = db.query(
            &format!(
                "SELECT version FROM {} ORDER BY applied_at ASC",
                self.qualified
            ),
            &[],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Applied versions, newest first (rollback order).
    pub fn applied_versions_desc(&self, db: &mut Db) -> Result<Vec<String>, ConfitureError> {
        let rows = db.query(
            &format!(
                "SELECT version FROM {} ORDER BY applied_at DESC",
                self.qualified
            ),
            &[],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Build a slug for a migration applied now.
    pub fn make_slug(name: &str, reason: Option<MarkReason>) -> String {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        match reason {
            Some(r) => format!("{}_{}{}", name, timestamp, r.slug_suffix()),
            None => format!("{}_{}", name, timestamp),
        }
    }

    /// Insert a tracking row for an executed migration.
    pub fn record(
        &self,
        db: &mut Db,
        version: &str,
        name: &str,
        execution_time_ms: i32,
        checksum: Option<&str>,
    ) -> Result<(), ConfitureError> {
        let slug = Self::make_slug(name, None);
        db.execute_params(
            &format!(
                "INSERT INTO {} (slug, version, name, execution_time_ms, checksum)
                 VALUES ($1, $2, $3, $4, $5)",
                self.qualified
            ),
            &[
                &slug,
                &version.to_string(),
                &name.to_string(),
                &execution_time_ms,
                &checksum.map(str::to_string),
            ],
        )?;
        Ok(())
    }

    /// Insert a tracking row without executing DDL; `reason` becomes the
    /// slug suffix.
    pub fn mark(
        &self,
        db: &mut Db,
        version: &str,
        name: &str,
        reason: MarkReason,
    ) -> Result<(), ConfitureError> {
        let slug = Self::make_slug(name, Some(reason));
        db.execute_params(
            &format!(
                "INSERT INTO {} (slug, version, name, execution_time_ms)
                 VALUES ($1, $2, $3, 0)",
                self.qualified
            ),
            &[&slug, &version.to_string(), &name.to_string()],
        )?;
        Ok(())
    }

    pub fn delete(&self, db: &mut Db, version: &str) -> Result<u64, ConfitureError> {
        db.execute_params(
            &format!("DELETE FROM {} WHERE version = $1", self.qualified),
            &[&version.to_string()],
        )
    }

    /// Delete every row, returning the count removed.
    pub fn clear(&self, db: &mut Db) -> Result<u64, ConfitureError> {
        db.execute_params(&format!("DELETE FROM {}", self.qualified), &[])
    }

    /// Row count.
    pub fn count(&self, db: &mut Db) -> Result<i64, ConfitureError> {
        let row = db.query_one(&format!("SELECT COUNT(*) FROM {}", self.qualified), &[])?;
        Ok(row.get(0))
    }

    /// All (version, name, checksum) triples.
    pub fn stored_checksums(
        &self,
        db: &mut Db,
    ) -> Result<Vec<(String, String, Option<String>)>, ConfitureError> {
        let rows = db.query(
            &format!(
                "SELECT version, name, checksum FROM {} ORDER BY version",
                self.qualified
            ),
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|r| (r.get(0), r.get(1), r.get(2)))
            .collect())
    }

    pub fn update_checksum(
        &self,
        db: &mut Db,
        version: &str,
        checksum: &str,
    ) -> Result<(), ConfitureError> {
        db.execute_params(
            &format!("UPDATE {} SET checksum = $1 WHERE version = $2", self.qualified),
            &[&checksum.to_string(), &version.to_string()],
        )?;
        Ok(())
    }

    /// Copy the table aside before destructive operations. Returns the
    /// backup table name.
    pub fn backup(&self, db: &mut Db) -> Result<String, ConfitureError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup_name = format!("{}_backup_{}", self.qualified, timestamp);
        db.execute(&format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            backup_name, self.qualified
        ))?;
        Ok(backup_name)
    }

    /// All slugs, for provenance inspection.
    pub fn slugs(&self, db: &mut Db) -> Result<Vec<String>, ConfitureError> {
        let rows = db.query(
            &format!("SELECT slug FROM {} ORDER BY version", self.qualified),
            &[],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}
