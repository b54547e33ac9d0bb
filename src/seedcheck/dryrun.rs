//! Levels 4 and 5: database dry-run validation.
//!
//! Level 4 creates the resolver functions inside a savepoint, executes them
//! against the prep-seed tables, and asserts that no FK columns remain NULL
//! after resolution. Level 5 additionally applies the seed inserts and
//! checks row counts. All changes roll back in both levels.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfitureError;
use crate::migrate::Db;
use crate::schema::split_statements;
use crate::seedcheck::consistency::SchemaContext;
use crate::seedcheck::extract::SeedData;
use crate::seedcheck::report::Violation;

static CREATE_FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*CREATE\s+(OR\s+REPLACE\s+)?FUNCTION\s+([\w.]*fn_resolve_\w+)").unwrap());

/// Resolver statements found in a DDL tree: (function name, statement).
pub fn extract_resolver_functions(ddl: &str) -> Vec<(String, String)> {
    split_statements(ddl)
        .into_iter()
        .filter_map(|stmt| {
            CREATE_FUNCTION_RE.captures(&stmt).map(|caps| {
                (caps.get(2).unwrap().as_str().to_string(), stmt.clone())
            })
        })
        .collect()
}

/// Database-backed dry-run validator.
pub struct DryRunValidator<'a> {
    db: &'a mut Db,
}

impl<'a> DryRunValidator<'a> {
    pub fn new(db: &'a mut Db) -> Self {
        Self { db }
    }

    /// Level 4: create resolvers, run them, assert FK columns resolved.
    /// Everything rolls back.
    pub fn validate_resolvers(
        &mut self,
        ddl: &str,
        seed_sql: &str,
        context: &SchemaContext,
    ) -> Result<Vec<Violation>, ConfitureError> {
        self.run_rolled_back(ddl, seed_sql, context, false)
    }

    /// Level 5: level 4 plus the actual seed inserts with row-count checks.
    /// Everything still rolls back.
    pub fn validate_full_execution(
        &mut self,
        ddl: &str,
        seed_sql: &str,
        context: &SchemaContext,
        seed_data: &SeedData,
    ) -> Result<Vec<Violation>, ConfitureError> {
        let mut violations = self.run_rolled_back(ddl, seed_sql, context, true)?;

        // Row-count verification happens inside its own rolled-back pass
        self.db.begin()?;
        self.db.create_savepoint("seed_full_check")?;
        let count_result = (|| -> Result<Vec<Violation>, ConfitureError> {
            let mut count_violations = Vec::new();
            self.db.execute(seed_sql)?;
            for (table, rows) in seed_data {
                let counted: i64 = match self
                    .db
                    .query_one(&format!("SELECT COUNT(*) FROM prep_seed.{}", table), &[])
                {
                    Ok(row) => row.get(0),
                    Err(_) => continue,
                };
                if counted < rows.len() as i64 {
                    count_violations.push(
                        Violation::error(
                            "FullExecution",
                            format!(
                                "Table prep_seed.{} has {} row(s) after seeding, expected {}",
                                table,
                                counted,
                                rows.len()
                            ),
                        )
                        .with_table(table.clone()),
                    );
                }
            }
            Ok(count_violations)
        })();
        self.db.rollback_to_savepoint("seed_full_check");
        let _ = self.db.rollback();

        match count_result {
            Ok(mut count_violations) => violations.append(&mut count_violations),
            Err(e) => violations.push(
                Violation::error("FullExecution", format!("Seed execution failed: {}", e)),
            ),
        }

        Ok(violations)
    }

    fn run_rolled_back(
        &mut self,
        ddl: &str,
        seed_sql: &str,
        context: &SchemaContext,
        apply_seeds_first: bool,
    ) -> Result<Vec<Violation>, ConfitureError> {
        let resolvers = extract_resolver_functions(ddl);
        let mut violations = Vec::new();

        self.db.begin()?;
        self.db.create_savepoint("seed_dry_run")?;

        let result = (|| -> Result<Vec<Violation>, ConfitureError> {
            let mut inner = Vec::new();

            if apply_seeds_first {
                self.db.execute(seed_sql)?;
            }

            for (_, statement) in &resolvers {
                self.db.execute(statement)?;
            }

            for (name, _) in &resolvers {
                if let Err(e) = self.db.execute(&format!("SELECT {}()", name)) {
                    inner.push(
                        Violation::error(
                            "ResolverDryRun",
                            format!("Resolver {} failed during dry-run: {}", name, e),
                        ),
                    );
                }
            }

            // FK columns must be fully resolved after the resolvers ran
            for (table, table_ctx) in context {
                for (column, column_ctx) in &table_ctx.columns {
                    if column_ctx.foreign_key.is_none() {
                        continue;
                    }
                    let count: i64 = match self.db.query_one(
                        &format!("SELECT COUNT(*) FROM {} WHERE {} IS NULL", table, column),
                        &[],
                    ) {
                        Ok(row) => row.get(0),
                        Err(_) => continue,
                    };
                    if count > 0 {
                        inner.push(
                            Violation::error(
                                "ResolverDryRun",
                                format!(
                                    "{} row(s) in {} still carry NULL {} after resolution",
                                    count, table, column
                                ),
                            )
                            .with_table(table.clone())
                            .with_column(column.clone()),
                        );
                    }
                }
            }

            Ok(inner)
        })();

        self.db.rollback_to_savepoint("seed_dry_run");
        let _ = self.db.rollback();

        match result {
            Ok(mut inner) => violations.append(&mut inner),
            Err(e) => violations.push(Violation::error(
                "ResolverDryRun",
                format!("Dry-run failed: {}", e),
            )),
        }

        Ok(violations)
    }
}
