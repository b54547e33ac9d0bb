//! Levels 2 and 3: schema-aware seed validation.
//!
//! Level 2 verifies the seed data against the declared DDL: referenced
//! tables and columns must exist, literal shapes must be compatible with
//! column types, and FK columns must target real unique columns. Level 3
//! confirms that every prep-seed table has its resolver function declared
//! in the DDL tree.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{ColumnType, Schema};
use crate::seedcheck::extract::SeedData;
use crate::seedcheck::report::Violation;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Level 2: seed data coherence against the declared schema.
#[derive(Debug, Default)]
pub struct SchemaCoherenceValidator;

impl SchemaCoherenceValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, seed_data: &SeedData, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (table_name, rows) in seed_data {
            let Some(table) = schema.get_table(table_name) else {
                violations.push(
                    Violation::error(
                        "SchemaCoherence",
                        format!("Seeded table {} does not exist in the schema", table_name),
                    )
                    .with_table(table_name.clone()),
                );
                continue;
            };

            // Column existence: check the union of seeded columns once
            let mut seen_columns: Vec<&String> = Vec::new();
            for row in rows {
                for column in row.keys() {
                    if !seen_columns.contains(&column) {
                        seen_columns.push(column);
                    }
                }
            }
            for column in &seen_columns {
                if table.get_column(column).is_none() {
                    violations.push(
                        Violation::error(
                            "SchemaCoherence",
                            format!(
                                "Column {}.{} does not exist in the schema",
                                table_name, column
                            ),
                        )
                        .with_table(table_name.clone())
                        .with_column((*column).clone()),
                    );
                }
            }

            // Literal-shape compatibility with declared types
            for (row_index, row) in rows.iter().enumerate() {
                for (column_name, value) in row {
                    let Some(column) = table.get_column(column_name) else {
                        continue;
                    };
                    let Some(value) = value else { continue };
                    if let Some(expected) = incompatible_literal(&column.col_type, value) {
                        violations.push(
                            Violation::error(
                                "SchemaCoherence",
                                format!(
                                    "Row {} of {}.{}: value '{}' is not a valid {}",
                                    row_index + 1,
                                    table_name,
                                    column_name,
                                    value,
                                    expected
                                ),
                            )
                            .with_table(table_name.clone())
                            .with_column(column_name.clone()),
                        );
                    }
                }
            }

            // FK targets must be real unique columns
            for fk in &table.foreign_keys {
                let Some(referenced) = schema.get_table(&fk.referenced_table) else {
                    violations.push(
                        Violation::error(
                            "SchemaCoherence",
                            format!(
                                "FK on {} references unknown table {}",
                                table_name, fk.referenced_table
                            ),
                        )
                        .with_table(table_name.clone()),
                    );
                    continue;
                };
                for ref_column in &fk.referenced_columns {
                    if referenced.get_column(ref_column).is_none() {
                        violations.push(
                            Violation::error(
                                "SchemaCoherence",
                                format!(
                                    "FK on {} references unknown column {}.{}",
                                    table_name, fk.referenced_table, ref_column
                                ),
                            )
                            .with_table(table_name.clone()),
                        );
                    } else if fk.referenced_columns.len() == 1
                        && !referenced.is_column_unique(ref_column)
                    {
                        violations.push(
                            Violation::warning(
                                "SchemaCoherence",
                                format!(
                                    "FK on {} targets {}.{} which carries no unique constraint",
                                    table_name, fk.referenced_table, ref_column
                                ),
                            )
                            .with_table(table_name.clone()),
                        );
                    }
                }
            }
        }

        violations
    }
}

/// A literal incompatible with the declared type: returns the expected
/// type label, or None when compatible.
fn incompatible_literal(col_type: &ColumnType, value: &str) -> Option<&'static str> {
    match col_type {
        ColumnType::Int | ColumnType::BigInt => {
            if NUMBER_RE.is_match(value) && !value.contains('.') {
                None
            } else {
                Some("integer")
            }
        }
        ColumnType::Decimal => {
            if NUMBER_RE.is_match(value) {
                None
            } else {
                Some("numeric")
            }
        }
        ColumnType::Uuid => {
            if UUID_RE.is_match(value) {
                None
            } else {
                Some("uuid")
            }
        }
        ColumnType::Bool => {
            if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
                None
            } else {
                Some("boolean")
            }
        }
        _ => None,
    }
}

/// Level 3: resolver function presence for prep-seed flows.
#[derive(Debug, Default)]
pub struct ResolverPresenceValidator;

impl ResolverPresenceValidator {
    pub fn new() -> Self {
        Self
    }

    /// Every seeded prep table needs `fn_resolve_<table>` declared in the
    /// DDL tree.
    pub fn validate(&self, seed_data: &SeedData, ddl: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let ddl_lower = ddl.to_lowercase();

        for table_name in seed_data.keys() {
            let resolver = format!("fn_resolve_{}", resolver_base_name(table_name));
            let declared = declares_function(&ddl_lower, &resolver);
            if !declared {
                violations.push(
                    Violation::error(
                        "ResolverPresence",
                        format!(
                            "Resolver function {} is not declared in the schema",
                            resolver
                        ),
                    )
                    .with_table(table_name.clone())
                    .with_suggestion(format!(
                        "Declare CREATE OR REPLACE FUNCTION {}() in the DDL tree",
                        resolver
                    )),
                );
            }
        }

        violations
    }
}

/// `tb_users` → `users`; anything else passes through.
pub fn resolver_base_name(table: &str) -> String {
    table.strip_prefix("tb_").unwrap_or(table).to_string()
}

fn declares_function(ddl_lower: &str, function_name: &str) -> bool {
    let needle = function_name.to_lowercase();
    let mut search_from = 0;
    while let Some(pos) = ddl_lower[search_from..].find(&needle) {
        let absolute = search_from + pos;
        let before = &ddl_lower[..absolute];
        if before.trim_end().ends_with("function")
            || before.trim_end().ends_with("function if not exists")
        {
            return true;
        }
        search_from = absolute + needle.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_sql;
    use crate::seedcheck::extract::DataExtractor;

    const SCHEMA_SQL: &str = r#"
        CREATE TABLE tb_customers (
            pk_customer UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE
        );
        CREATE TABLE tb_orders (
            pk_order UUID PRIMARY KEY,
            fk_customer UUID NOT NULL,
            total NUMERIC(10,2),
            CONSTRAINT fk_orders_customer FOREIGN KEY (fk_customer)
                REFERENCES tb_customers (pk_customer)
        );
    "#;

    #[test]
    fn test_coherent_seed_passes() {
        let schema = parse_sql(SCHEMA_SQL);
        let data = DataExtractor::new().extract(
            "INSERT INTO tb_customers (pk_customer, email) VALUES \
             ('123e4567-e89b-12d3-a456-426614174000', 'a@x.io');",
        );
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_unknown_table_flagged() {
        let schema = parse_sql(SCHEMA_SQL);
        let data = DataExtractor::new().extract("INSERT INTO tb_ghost (id) VALUES (1);");
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("tb_ghost"));
    }

    #[test]
    fn test_unknown_column_flagged() {
        let schema = parse_sql(SCHEMA_SQL);
        let data = DataExtractor::new().extract(
            "INSERT INTO tb_customers (pk_customer, nickname) VALUES \
             ('123e4567-e89b-12d3-a456-426614174000', 'al');",
        );
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert!(violations.iter().any(|v| v.message.contains("nickname")));
    }

    #[test]
    fn test_bad_uuid_literal_flagged() {
        let schema = parse_sql(SCHEMA_SQL);
        let data = DataExtractor::new()
            .extract("INSERT INTO tb_customers (pk_customer, email) VALUES ('nope', 'a@x.io');");
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert!(violations.iter().any(|v| v.message.contains("not a valid uuid")));
    }

    #[test]
    fn test_bad_numeric_literal_flagged() {
        let schema = parse_sql(SCHEMA_SQL);
        let data = DataExtractor::new().extract(
            "INSERT INTO tb_orders (pk_order, fk_customer, total) VALUES \
             ('123e4567-e89b-12d3-a456-426614174000', \
              '123e4567-e89b-12d3-a456-426614174001', 'lots');",
        );
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert!(violations.iter().any(|v| v.message.contains("not a valid numeric")));
    }

    #[test]
    fn test_fk_target_without_unique_warns() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_tags (label TEXT);
            CREATE TABLE tb_posts (
                pk_post BIGINT PRIMARY KEY,
                tag_label TEXT,
                CONSTRAINT fk_posts_tag FOREIGN KEY (tag_label)
                    REFERENCES tb_tags (label)
            );
            "#,
        );
        let data = DataExtractor::new().extract("INSERT INTO tb_posts (pk_post) VALUES (1);");
        let violations = SchemaCoherenceValidator::new().validate(&data, &schema);
        assert!(violations
            .iter()
            .any(|v| v.message.contains("no unique constraint")));
    }

    #[test]
    fn test_resolver_present() {
        let ddl = "CREATE OR REPLACE FUNCTION fn_resolve_customers() RETURNS void AS $$ \
                   BEGIN END; $$ LANGUAGE plpgsql;";
        let data = DataExtractor::new()
            .extract("INSERT INTO tb_customers (id) VALUES (1);");
        let violations = ResolverPresenceValidator::new().validate(&data, ddl);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_resolver_missing() {
        let data = DataExtractor::new()
            .extract("INSERT INTO tb_customers (id) VALUES (1);");
        let violations = ResolverPresenceValidator::new().validate(&data, "CREATE TABLE x (i INT);");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("fn_resolve_customers"));
    }

    #[test]
    fn test_resolver_name_mentioned_but_not_declared() {
        // A call site alone does not count as a declaration
        let ddl = "SELECT fn_resolve_customers();";
        let data = DataExtractor::new()
            .extract("INSERT INTO tb_customers (id) VALUES (1);");
        let violations = ResolverPresenceValidator::new().validate(&data, ddl);
        assert_eq!(violations.len(), 1);
    }
}
