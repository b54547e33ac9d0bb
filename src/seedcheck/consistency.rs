//! Cross-cutting seed data consistency validators.
//!
//! Five validators over the extracted seed data and a schema context:
//! foreign keys, unique constraints (single and composite), NOT NULL,
//! completeness, and (separately, in `comparator`) environment comparison.
//! Value comparison uses string semantics; NULL never violates FK or
//! UNIQUE.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};

use crate::schema::Schema;
use crate::seedcheck::extract::SeedData;
use crate::seedcheck::report::Violation;

/// Constraint metadata for one column.
#[derive(Debug, Clone, Default)]
pub struct ColumnContext {
    /// (referenced table, referenced column)
    pub foreign_key: Option<(String, String)>,
    pub unique: bool,
    pub not_null: bool,
}

/// Constraint metadata for one table.
#[derive(Debug, Clone, Default)]
pub struct TableContext {
    pub columns: BTreeMap<String, ColumnContext>,
    /// Composite UNIQUE constraints (column lists)
    pub unique_constraints: Vec<Vec<String>>,
    /// Must this table be seeded at all?
    pub required: bool,
    /// Minimum row count when seeded (0 = no minimum)
    pub min_rows: usize,
}

/// Schema constraint context for the validators.
pub type SchemaContext = BTreeMap<String, TableContext>;

/// Build a [`SchemaContext`] from a parsed DDL schema.
pub fn context_from_schema(schema: &Schema) -> SchemaContext {
    let mut context = SchemaContext::new();
    for table in schema.iter() {
        let mut table_ctx = TableContext::default();
        for column in &table.columns {
            let fk = table
                .foreign_keys
                .iter()
                .find(|fk| {
                    fk.column_names.len() == 1
                        && fk.column_names[0].eq_ignore_ascii_case(&column.name)
                })
                .map(|fk| {
                    let referenced_column = fk
                        .referenced_columns
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "id".to_string());
                    (fk.referenced_table.clone(), referenced_column)
                });
            table_ctx.columns.insert(
                column.name.clone(),
                ColumnContext {
                    foreign_key: fk,
                    unique: column.is_unique,
                    not_null: !column.is_nullable && !column.is_primary_key,
                },
            );
        }
        for uc in &table.unique_constraints {
            if uc.columns.len() > 1 {
                table_ctx.unique_constraints.push(uc.columns.clone());
            }
        }
        context.insert(table.name.clone(), table_ctx);
    }
    context
}

/// Validates that every FK value exists in its referenced column.
#[derive(Debug, Default)]
pub struct ForeignKeyValidator;

impl ForeignKeyValidator {
    pub fn validate(&self, seed_data: &SeedData, context: &SchemaContext) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (table_name, table_ctx) in context {
            let Some(rows) = seed_data.get(table_name) else {
                continue;
            };

            for (column_name, column_ctx) in &table_ctx.columns {
                let Some((ref_table, ref_column)) = &column_ctx.foreign_key else {
                    continue;
                };

                let Some(ref_rows) = seed_data.get(ref_table) else {
                    // Referenced table absent: every non-NULL FK is a violation
                    for row in rows {
                        if let Some(Some(value)) = row.get(column_name) {
                            violations.push(
                                Violation::error(
                                    "ForeignKey",
                                    format!(
                                        "Foreign key {}.{} = {} references missing table {}",
                                        table_name, column_name, value, ref_table
                                    ),
                                )
                                .with_table(table_name.clone())
                                .with_column(column_name.clone()),
                            );
                        }
                    }
                    continue;
                };

                let valid_refs: AHashSet<&str> = ref_rows
                    .iter()
                    .filter_map(|row| row.get(ref_column).and_then(|v| v.as_deref()))
                    .collect();

                for row in rows {
                    let Some(Some(value)) = row.get(column_name) else {
                        // NULL is allowed in optional FKs
                        continue;
                    };
                    if !valid_refs.contains(value.as_str()) {
                        violations.push(
                            Violation::error(
                                "ForeignKey",
                                format!(
                                    "Foreign key {}.{} = {} does not exist in {}.{}",
                                    table_name, column_name, value, ref_table, ref_column
                                ),
                            )
                            .with_table(table_name.clone())
                            .with_column(column_name.clone()),
                        );
                    }
                }
            }
        }

        violations
    }
}

/// Validates single-column and composite UNIQUE constraints.
#[derive(Debug, Default)]
pub struct UniqueValidator;

impl UniqueValidator {
    pub fn validate(&self, seed_data: &SeedData, context: &SchemaContext) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (table_name, table_ctx) in context {
            let Some(rows) = seed_data.get(table_name) else {
                continue;
            };

            for (column_name, column_ctx) in &table_ctx.columns {
                if !column_ctx.unique {
                    continue;
                }
                let mut counts: AHashMap<&str, usize> = AHashMap::new();
                for row in rows {
                    // NULLs never collide
                    if let Some(Some(value)) = row.get(column_name) {
                        *counts.entry(value.as_str()).or_default() += 1;
                    }
                }
                let mut duplicates: Vec<(&str, usize)> =
                    counts.into_iter().filter(|(_, n)| *n > 1).collect();
                duplicates.sort();
                for (value, count) in duplicates {
                    violations.push(
                        Violation::error(
                            "Unique",
                            format!(
                                "Column {}.{} is UNIQUE but value {} appears {} times",
                                table_name, column_name, value, count
                            ),
                        )
                        .with_table(table_name.clone())
                        .with_column(column_name.clone()),
                    );
                }
            }

            for constraint in &table_ctx.unique_constraints {
                let mut counts: AHashMap<Vec<&str>, usize> = AHashMap::new();
                for row in rows {
                    let mut key = Vec::with_capacity(constraint.len());
                    let mut has_null = false;
                    for column in constraint {
                        match row.get(column) {
                            Some(Some(value)) => key.push(value.as_str()),
                            _ => {
                                has_null = true;
                                break;
                            }
                        }
                    }
                    // A composite key with any NULL is skipped
                    if has_null {
                        continue;
                    }
                    *counts.entry(key).or_default() += 1;
                }
                let columns = constraint.join(", ");
                let mut duplicates: Vec<(Vec<&str>, usize)> =
                    counts.into_iter().filter(|(_, n)| *n > 1).collect();
                duplicates.sort();
                for (key, count) in duplicates {
                    violations.push(
                        Violation::error(
                            "Unique",
                            format!(
                                "Composite UNIQUE constraint on {}({}) violated: key ({}) \
                                 appears {} times",
                                table_name,
                                columns,
                                key.join(" / "),
                                count
                            ),
                        )
                        .with_table(table_name.clone())
                        .with_column(columns.clone()),
                    );
                }
            }
        }

        violations
    }
}

/// Validates that required columns carry non-null values.
#[derive(Debug, Default)]
pub struct NotNullValidator;

impl NotNullValidator {
    pub fn validate(&self, seed_data: &SeedData, context: &SchemaContext) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (table_name, table_ctx) in context {
            let Some(rows) = seed_data.get(table_name) else {
                continue;
            };

            for (column_name, column_ctx) in &table_ctx.columns {
                if !column_ctx.not_null {
                    continue;
                }
                for (row_index, row) in rows.iter().enumerate() {
                    // Exact null detection: only an explicit NULL (or a
                    // missing column) violates; empty strings do not.
                    let is_null = !matches!(row.get(column_name), Some(Some(_)));
                    if is_null {
                        violations.push(
                            Violation::error(
                                "NotNull",
                                format!(
                                    "Column {}.{} is NOT NULL but row {} has no value",
                                    table_name,
                                    column_name,
                                    row_index + 1
                                ),
                            )
                            .with_table(table_name.clone())
                            .with_column(column_name.clone()),
                        );
                    }
                }
            }
        }

        violations
    }
}

/// Validates table presence and minimum row counts.
#[derive(Debug, Default)]
pub struct CompletenessValidator;

impl CompletenessValidator {
    pub fn validate(&self, seed_data: &SeedData, context: &SchemaContext) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (table_name, table_ctx) in context {
            let rows = seed_data.get(table_name);

            if table_ctx.required && rows.map(|r| r.is_empty()).unwrap_or(true) {
                violations.push(
                    Violation::error(
                        "Completeness",
                        format!("Required table {} has no seed data", table_name),
                    )
                    .with_table(table_name.clone()),
                );
                continue;
            }

            if table_ctx.min_rows > 0 {
                let count = rows.map(|r| r.len()).unwrap_or(0);
                if count < table_ctx.min_rows {
                    violations.push(
                        Violation::error(
                            "Completeness",
                            format!(
                                "Table {} has {} row(s), expected at least {}",
                                table_name, count, table_ctx.min_rows
                            ),
                        )
                        .with_table(table_name.clone()),
                    );
                }
            }
        }

        violations
    }
}

/// Runs all consistency validators in sequence.
#[derive(Debug, Default)]
pub struct ConsistencyValidator {
    pub stop_on_first_violation: bool,
}

impl ConsistencyValidator {
    pub fn new(stop_on_first_violation: bool) -> Self {
        Self {
            stop_on_first_violation,
        }
    }

    /// Run FK, Unique, NotNull, and Completeness in order, returning
    /// (violations, names of validators that ran).
    pub fn validate(
        &self,
        seed_data: &SeedData,
        context: &SchemaContext,
    ) -> (Vec<Violation>, Vec<String>) {
        type Step = (&'static str, fn(&SeedData, &SchemaContext) -> Vec<Violation>);
        let steps: [Step; 4] = [
            ("ForeignKeyValidator", |d, c| ForeignKeyValidator.validate(d, c)),
            ("UniqueValidator", |d, c| UniqueValidator.validate(d, c)),
            ("NotNullValidator", |d, c| NotNullValidator.validate(d, c)),
            ("CompletenessValidator", |d, c| {
                CompletenessValidator.validate(d, c)
            }),
        ];

        let mut violations: Vec<Violation> = Vec::new();
        let mut validators_run = Vec::new();

        for (name, step) in steps {
            if self.stop_on_first_violation && !violations.is_empty() {
                break;
            }
            validators_run.push(name.to_string());
            violations.extend(step(seed_data, context));
        }

        (violations, validators_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seedcheck::extract::DataExtractor;

    fn context_with_fk() -> SchemaContext {
        let mut context = SchemaContext::new();
        context.insert("customers".to_string(), TableContext::default());
        let mut orders = TableContext::default();
        orders.columns.insert(
            "customer_id".to_string(),
            ColumnContext {
                foreign_key: Some(("customers".to_string(), "id".to_string())),
                ..Default::default()
            },
        );
        context.insert("orders".to_string(), orders);
        context
    }

    #[test]
    fn test_fk_valid_reference() {
        let data = DataExtractor::new().extract(
            "INSERT INTO customers (id, name) VALUES ('c-1', 'Alice');\
             INSERT INTO orders (id, customer_id) VALUES ('o-1', 'c-1');",
        );
        let violations = ForeignKeyValidator.validate(&data, &context_with_fk());
        assert!(violations.is_empty());
    }

    #[test]
    fn test_fk_missing_reference() {
        let data = DataExtractor::new().extract(
            "INSERT INTO customers (id) VALUES ('c-1');\
             INSERT INTO orders (id, customer_id) VALUES ('o-1', 'c-999');",
        );
        let violations = ForeignKeyValidator.validate(&data, &context_with_fk());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("c-999"));
    }

    #[test]
    fn test_fk_null_allowed() {
        let data = DataExtractor::new().extract(
            "INSERT INTO customers (id) VALUES ('c-1');\
             INSERT INTO orders (id, customer_id) VALUES ('o-1', NULL);",
        );
        let violations = ForeignKeyValidator.validate(&data, &context_with_fk());
        assert!(violations.is_empty());
    }

    #[test]
    fn test_fk_missing_referenced_table() {
        let data = DataExtractor::new()
            .extract("INSERT INTO orders (id, customer_id) VALUES ('o-1', 'c-1');");
        let violations = ForeignKeyValidator.validate(&data, &context_with_fk());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("missing table customers"));
    }

    fn context_with_unique() -> SchemaContext {
        let mut context = SchemaContext::new();
        let mut users = TableContext::default();
        users.columns.insert(
            "email".to_string(),
            ColumnContext {
                unique: true,
                ..Default::default()
            },
        );
        context.insert("users".to_string(), users);
        context
    }

    #[test]
    fn test_unique_duplicate_detected() {
        let data = DataExtractor::new().extract(
            "INSERT INTO users (id, email) VALUES (1, 'a@x.io'), (2, 'a@x.io');",
        );
        let violations = UniqueValidator.validate(&data, &context_with_unique());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("appears 2 times"));
    }

    #[test]
    fn test_unique_nulls_never_collide() {
        let data = DataExtractor::new()
            .extract("INSERT INTO users (id, email) VALUES (1, NULL), (2, NULL);");
        let violations = UniqueValidator.validate(&data, &context_with_unique());
        assert!(violations.is_empty());
    }

    #[test]
    fn test_composite_unique() {
        let mut context = SchemaContext::new();
        let mut slots = TableContext::default();
        slots
            .unique_constraints
            .push(vec!["day".to_string(), "room".to_string()]);
        context.insert("slots".to_string(), slots);

        let data = DataExtractor::new().extract(
            "INSERT INTO slots (day, room) VALUES ('mon', 'a'), ('mon', 'a'), ('mon', 'b');",
        );
        let violations = UniqueValidator.validate(&data, &context);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("mon / a"));
    }

    #[test]
    fn test_composite_unique_null_skipped() {
        let mut context = SchemaContext::new();
        let mut slots = TableContext::default();
        slots
            .unique_constraints
            .push(vec!["day".to_string(), "room".to_string()]);
        context.insert("slots".to_string(), slots);

        let data = DataExtractor::new().extract(
            "INSERT INTO slots (day, room) VALUES ('mon', NULL), ('mon', NULL);",
        );
        let violations = UniqueValidator.validate(&data, &context);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_not_null_detects_null_only() {
        let mut context = SchemaContext::new();
        let mut users = TableContext::default();
        users.columns.insert(
            "name".to_string(),
            ColumnContext {
                not_null: true,
                ..Default::default()
            },
        );
        context.insert("users".to_string(), users);

        // Empty string is a value, not NULL
        let ok = DataExtractor::new().extract("INSERT INTO users (id, name) VALUES (1, '');");
        assert!(NotNullValidator.validate(&ok, &context).is_empty());

        let bad = DataExtractor::new().extract("INSERT INTO users (id, name) VALUES (1, NULL);");
        let violations = NotNullValidator.validate(&bad, &context);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_completeness_required_and_min_rows() {
        let mut context = SchemaContext::new();
        context.insert(
            "roles".to_string(),
            TableContext {
                required: true,
                ..Default::default()
            },
        );
        context.insert(
            "countries".to_string(),
            TableContext {
                min_rows: 3,
                ..Default::default()
            },
        );

        let data = DataExtractor::new()
            .extract("INSERT INTO countries (code) VALUES ('fr'), ('de');");
        let violations = CompletenessValidator.validate(&data, &context);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.message.contains("roles")));
        assert!(violations
            .iter()
            .any(|v| v.message.contains("expected at least 3")));
    }

    #[test]
    fn test_orchestrated_run_order() {
        let data = SeedData::new();
        let context = SchemaContext::new();
        let (violations, validators) = ConsistencyValidator::new(false).validate(&data, &context);
        assert!(violations.is_empty());
        assert_eq!(
            validators,
            vec![
                "ForeignKeyValidator",
                "UniqueValidator",
                "NotNullValidator",
                "CompletenessValidator"
            ]
        );
    }

    #[test]
    fn test_stop_on_first_violation() {
        let mut context = SchemaContext::new();
        context.insert(
            "roles".to_string(),
            TableContext {
                required: true,
                ..Default::default()
            },
        );
        let mut orders = TableContext::default();
        orders.columns.insert(
            "customer_id".to_string(),
            ColumnContext {
                foreign_key: Some(("customers".to_string(), "id".to_string())),
                ..Default::default()
            },
        );
        context.insert("orders".to_string(), orders);

        let data = DataExtractor::new()
            .extract("INSERT INTO orders (id, customer_id) VALUES ('o-1', 'c-1');");
        let (violations, validators) = ConsistencyValidator::new(true).validate(&data, &context);
        assert_eq!(violations.len(), 1);
        assert_eq!(validators, vec!["ForeignKeyValidator"]);
    }
}
