//! PostgreSQL DDL parsing for schema extraction.
//!
//! Parses CREATE TABLE, ALTER TABLE, CREATE INDEX, and COMMENT ON TABLE
//! statements to extract:
//! - Column definitions with types and nullability
//! - Primary key, foreign key, and unique constraints
//! - Index definitions
//! - Table comments

use super::{
    Column, ColumnId, ColumnType, ForeignKey, IndexDef, Schema, TableSchema, UniqueConstraint,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Table name from CREATE TABLE, with optional schema qualifier and quoting
static CREATE_TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:"?([A-Za-z_][\w]*)"?\s*\.\s*)?"?([A-Za-z_][\w]*)"?"#,
    )
    .unwrap()
});

/// Table name from ALTER TABLE
static ALTER_TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)ALTER\s+TABLE\s+(?:ONLY\s+)?(?:IF\s+EXISTS\s+)?(?:"?([A-Za-z_][\w]*)"?\s*\.\s*)?"?([A-Za-z_][\w]*)"?"#,
    )
    .unwrap()
});

/// Column definition: quoted or bare identifier followed by a type
static COLUMN_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?([A-Za-z_][\w]*)"?\s+(\w+(?:\s+varying)?(?:\([^)]+\))?(?:\[\])?)"#).unwrap()
});

/// Table-level PRIMARY KEY constraint
static PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PRIMARY\s+KEY\s*\(([^)]+)\)").unwrap());

/// Inline PRIMARY KEY on a column
static INLINE_PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").unwrap());

/// FOREIGN KEY constraint with optional constraint name
static FOREIGN_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:CONSTRAINT\s+"?([\w]+)"?\s+)?FOREIGN\s+KEY\s*\(([^)]+)\)\s*REFERENCES\s+(?:"?[\w]+"?\s*\.\s*)?"?([\w]+)"?\s*\(([^)]+)\)"#,
    )
    .unwrap()
});

/// Inline REFERENCES on a column definition
static INLINE_REFERENCES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bREFERENCES\s+(?:"?[\w]+"?\s*\.\s*)?"?([\w]+)"?\s*(?:\(([^)]+)\))?"#)
        .unwrap()
});

/// Table-level UNIQUE constraint
static UNIQUE_CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:CONSTRAINT\s+"?([\w]+)"?\s+)?UNIQUE\s*\(([^)]+)\)"#).unwrap()
});

static NOT_NULL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNOT\s+NULL\b").unwrap());

static INLINE_UNIQUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bUNIQUE\b").unwrap());

/// CREATE INDEX statement
static CREATE_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+(UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?"?([\w]+)"?\s+ON\s+(?:ONLY\s+)?(?:"?[\w]+"?\s*\.\s*)?"?([\w]+)"?\s*(?:USING\s+(\w+)\s*)?\(([^)]+)\)"#,
    )
    .unwrap()
});

/// COMMENT ON TABLE statement
static TABLE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)COMMENT\s+ON\s+TABLE\s+(?:"?[\w]+"?\s*\.\s*)?"?([\w]+)"?\s+IS\s+'((?:[^']|'')*)'"#,
    )
    .unwrap()
});

/// Parse a full DDL script into a [`Schema`].
///
/// Statements are split on semicolons (string- and comment-aware), then each
/// CREATE TABLE / ALTER TABLE / CREATE INDEX / COMMENT ON TABLE is applied in
/// order.
pub fn parse_sql(sql: &str) -> Schema {
    let mut parser = DdlParser::new();
    for stmt in split_statements(sql) {
        parser.parse_statement(&stmt);
    }
    parser.build()
}

/// Incremental DDL parser building a [`Schema`].
#[derive(Debug, Default)]
pub struct DdlParser {
    schema: Schema,
}

impl DdlParser {
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
        }
    }

    /// Dispatch a single statement to the matching handler.
    pub fn parse_statement(&mut self, stmt: &str) {
        let head = leading_keywords(stmt);
        if head.starts_with("CREATE TABLE") {
            self.parse_create_table(stmt);
        } else if head.starts_with("ALTER TABLE") {
            self.parse_alter_table(stmt);
        } else if head.starts_with("CREATE INDEX") || head.starts_with("CREATE UNIQUE INDEX") {
            self.parse_create_index(stmt);
        } else if head.starts_with("COMMENT ON TABLE") {
            self.parse_table_comment(stmt);
        }
    }

    pub fn parse_create_table(&mut self, stmt: &str) -> Option<super::TableId> {
        let caps = CREATE_TABLE_NAME_RE.captures(stmt)?;
        let schema_name = caps.get(1).map(|m| m.as_str().to_string());
        let table_name = caps.get(2)?.as_str().to_string();

        if let Some(existing) = self.schema.get_table_id(&table_name) {
            return Some(existing);
        }

        let mut table = TableSchema::new(table_name, super::TableId(0));
        table.schema = schema_name;
        table.create_statement = Some(stmt.to_string());

        if let Some(body) = extract_table_body(stmt) {
            parse_table_body(&body, &mut table);
        }

        let id = self.schema.add_table(table);
        Some(id)
    }

    pub fn parse_alter_table(&mut self, stmt: &str) -> Option<super::TableId> {
        let caps = ALTER_TABLE_NAME_RE.captures(stmt)?;
        let table_name = caps.get(2)?.as_str().to_string();
        let table_id = self.schema.get_table_id(&table_name)?;

        let fks = parse_foreign_keys(stmt);
        let uniques: Vec<UniqueConstraint> = if FOREIGN_KEY_RE.is_match(stmt) {
            Vec::new()
        } else {
            parse_unique_constraints(stmt)
        };
        let pk_cols = if stmt.to_uppercase().contains("ADD") {
            parse_primary_key_constraint(stmt)
        } else {
            None
        };

        if let Some(table) = self.schema.table_mut(table_id) {
            table.foreign_keys.extend(fks);
            table.unique_constraints.extend(uniques);
            if let Some(cols) = pk_cols {
                for name in &cols {
                    if let Some(col) = table.get_column_mut(name) {
                        col.is_primary_key = true;
                    }
                }
                table.primary_key = cols;
            }
        }

        Some(table_id)
    }

    pub fn parse_create_index(&mut self, stmt: &str) -> Option<super::TableId> {
        let caps = CREATE_INDEX_RE.captures(stmt)?;

        let is_unique = caps.get(1).is_some();
        let index_name = caps.get(2)?.as_str().to_string();
        let table_name = caps.get(3)?.as_str().to_string();
        let index_type = caps.get(4).map(|m| m.as_str().to_uppercase());
        let columns = parse_column_list(caps.get(5)?.as_str());

        let table_id = self.schema.get_table_id(&table_name)?;
        if let Some(table) = self.schema.table_mut(table_id) {
            table.indexes.push(IndexDef {
                name: index_name,
                columns,
                is_unique,
                index_type,
            });
        }
        Some(table_id)
    }

    pub fn parse_table_comment(&mut self, stmt: &str) -> Option<super::TableId> {
        let caps = TABLE_COMMENT_RE.captures(stmt)?;
        let table_name = caps.get(1)?.as_str().to_string();
        let comment = caps.get(2)?.as_str().replace("''", "'");

        let table_id = self.schema.get_table_id(&table_name)?;
        if let Some(table) = self.schema.table_mut(table_id) {
            table.comment = Some(comment);
        }
        Some(table_id)
    }

    /// Finalize the schema, marking FK columns.
    pub fn build(mut self) -> Schema {
        self.schema.mark_foreign_key_columns();
        self.schema
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Uppercased leading keywords of a statement (comments stripped).
fn leading_keywords(stmt: &str) -> String {
    let stripped = strip_leading_comments(stmt);
    stripped
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Strip leading `--` and `/* */` comments from a statement.
pub fn strip_leading_comments(stmt: &str) -> &str {
    let mut rest = stmt.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            match after.find('\n') {
                Some(pos) => rest = after[pos + 1..].trim_start(),
                None => return "",
            }
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(pos) => rest = after[pos + 2..].trim_start(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}

/// Split a SQL script into statements on `;`, respecting single-quoted
/// strings, dollar-quoted strings, line comments, and block comments.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < sql.len() {
        let c = sql[i..].chars().next().unwrap();

        // Line comment
        if c == '-' && bytes.get(i + 1) == Some(&b'-') {
            let end = sql[i..].find('\n').map(|p| i + p).unwrap_or(sql.len());
            current.push_str(&sql[i..end]);
            i = end;
            continue;
        }

        // Block comment
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            let end = sql[i + 2..]
                .find("*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(sql.len());
            current.push_str(&sql[i..end]);
            i = end;
            continue;
        }

        // Single-quoted string (doubled quotes stay inside)
        if c == '\'' {
            let mut j = i + 1;
            while j < bytes.len() {
                if bytes[j] == b'\'' {
                    if bytes.get(j + 1) == Some(&b'\'') {
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                j += 1;
            }
            current.push_str(&sql[i..j]);
            i = j;
            continue;
        }

        // Dollar-quoted string ($$ ... $$ or $tag$ ... $tag$)
        if c == '$' {
            if let Some(tag_end) = sql[i + 1..].find('$') {
                let tag = &sql[i..i + 1 + tag_end + 1];
                if tag.len() >= 2 && tag[1..tag.len() - 1].chars().all(|t| t.is_alphanumeric() || t == '_')
                {
                    let body_start = i + tag.len();
                    if let Some(close) = sql[body_start..].find(tag) {
                        let end = body_start + close + tag.len();
                        current.push_str(&sql[i..end]);
                        i = end;
                        continue;
                    }
                }
            }
        }

        if c == ';' {
            let stmt = current.trim();
            if !stmt.is_empty() {
                statements.push(stmt.to_string());
            }
            current.clear();
            i += 1;
            continue;
        }

        current.push(c);
        i += c.len_utf8();
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }

    statements
}

/// Extract the body of a CREATE TABLE statement (between first ( and matching ))
fn extract_table_body(stmt: &str) -> Option<String> {
    let bytes = stmt.as_bytes();
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];

        if b == b'\'' {
            if in_string && bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            in_string = !in_string;
            i += 1;
            continue;
        }

        if in_string {
            i += 1;
            continue;
        }

        if b == b'(' {
            if depth == 0 {
                start = Some(i + 1);
            }
            depth += 1;
        } else if b == b')' {
            depth -= 1;
            if depth == 0 {
                if let Some(s) = start {
                    return Some(stmt[s..i].to_string());
                }
            }
        }
        i += 1;
    }

    None
}

/// Parse the body of a CREATE TABLE to extract columns and constraints
fn parse_table_body(body: &str, table: &mut TableSchema) {
    for part in split_table_body(body) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let upper = trimmed.to_uppercase();
        let is_constraint = upper.starts_with("PRIMARY KEY")
            || upper.starts_with("CONSTRAINT")
            || upper.starts_with("FOREIGN KEY")
            || upper.starts_with("UNIQUE ")
            || upper.starts_with("UNIQUE(")
            || upper.starts_with("CHECK ")
            || upper.starts_with("CHECK(")
            || upper.starts_with("EXCLUDE ")
            || upper.starts_with("LIKE ");

        if is_constraint {
            if let Some(pk_cols) = parse_primary_key_constraint(trimmed) {
                for col_name in &pk_cols {
                    if let Some(col) = table.get_column_mut(col_name) {
                        col.is_primary_key = true;
                    }
                }
                table.primary_key = pk_cols;
            } else if let Some(fk) = parse_foreign_keys(trimmed).into_iter().next() {
                table.foreign_keys.push(fk);
            } else if let Some(uc) = parse_unique_constraints(trimmed).into_iter().next() {
                if uc.columns.len() == 1 {
                    if let Some(col) = table.get_column_mut(&uc.columns[0]) {
                        col.is_unique = true;
                    }
                }
                table.unique_constraints.push(uc);
            }
        } else if let Some(mut col) = parse_column_def(trimmed, ColumnId(table.columns.len() as u16))
        {
            if INLINE_PRIMARY_KEY_RE.is_match(trimmed) {
                col.is_primary_key = true;
                col.is_nullable = false;
                table.primary_key.push(col.name.clone());
            }
            // UNIQUE alone, not part of the PRIMARY KEY wording
            if INLINE_UNIQUE_RE.is_match(trimmed) && !col.is_primary_key {
                col.is_unique = true;
            }
            if let Some(caps) = INLINE_REFERENCES_RE.captures(trimmed) {
                let referenced_table = caps.get(1).map(|m| m.as_str().to_string()).unwrap();
                let referenced_columns = caps
                    .get(2)
                    .map(|m| parse_column_list(m.as_str()))
                    .unwrap_or_default();
                table.foreign_keys.push(ForeignKey {
                    name: None,
                    column_names: vec![col.name.clone()],
                    referenced_table,
                    referenced_columns,
                });
            }
            table.columns.push(col);
        }
    }
}

/// Split table body by commas, respecting nested parentheses and strings
pub fn split_table_body(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut in_string = false;

    for c in body.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth -= 1;
                current.push(c);
            }
            ',' if !in_string && depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        parts.push(current);
    }

    parts
}

/// Parse a single column definition
fn parse_column_def(def: &str, ordinal: ColumnId) -> Option<Column> {
    let caps = COLUMN_DEF_RE.captures(def)?;
    let name = caps.get(1)?.as_str().to_string();
    let sql_type = caps.get(2)?.as_str().to_string();

    // Guard against constraint keywords picked up as column names
    let upper = name.to_uppercase();
    if matches!(
        upper.as_str(),
        "PRIMARY" | "FOREIGN" | "CONSTRAINT" | "UNIQUE" | "CHECK" | "EXCLUDE" | "LIKE"
    ) {
        return None;
    }

    Some(Column {
        col_type: ColumnType::from_sql_type(&sql_type),
        sql_type,
        name,
        ordinal,
        is_primary_key: false,
        is_nullable: !NOT_NULL_RE.is_match(def),
        is_unique: false,
        is_foreign_key: false,
    })
}

/// Parse a table-level PRIMARY KEY constraint into column names
fn parse_primary_key_constraint(def: &str) -> Option<Vec<String>> {
    let caps = PRIMARY_KEY_RE.captures(def)?;
    Some(parse_column_list(caps.get(1)?.as_str()))
}

/// Parse FOREIGN KEY constraints from a statement or body fragment
pub fn parse_foreign_keys(text: &str) -> Vec<ForeignKey> {
    FOREIGN_KEY_RE
        .captures_iter(text)
        .map(|caps| ForeignKey {
            name: caps.get(1).map(|m| m.as_str().to_string()),
            column_names: parse_column_list(caps.get(2).map(|m| m.as_str()).unwrap_or("")),
            referenced_table: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
            referenced_columns: parse_column_list(caps.get(4).map(|m| m.as_str()).unwrap_or("")),
        })
        .collect()
}

/// Parse UNIQUE constraints from a statement or body fragment
fn parse_unique_constraints(text: &str) -> Vec<UniqueConstraint> {
    UNIQUE_CONSTRAINT_RE
        .captures_iter(text)
        .map(|caps| UniqueConstraint {
            name: caps.get(1).map(|m| m.as_str().to_string()),
            columns: parse_column_list(caps.get(2).map(|m| m.as_str()).unwrap_or("")),
        })
        .collect()
}

/// Parse a comma-separated column list, stripping quotes
pub fn parse_column_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_create_table() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_users (
                pk_user BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                display_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        );

        let table = schema.get_table("tb_users").unwrap();
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.primary_key, vec!["pk_user".to_string()]);

        let email = table.get_column("email").unwrap();
        assert!(!email.is_nullable);
        assert!(email.is_unique);
        assert_eq!(email.col_type, ColumnType::Text);

        let name = table.get_column("display_name").unwrap();
        assert!(name.is_nullable);
    }

    #[test]
    fn test_parse_foreign_key_constraint() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_customers (pk_customer BIGINT PRIMARY KEY);
            CREATE TABLE tb_orders (
                pk_order BIGINT PRIMARY KEY,
                fk_customer BIGINT NOT NULL,
                CONSTRAINT fk_orders_customer FOREIGN KEY (fk_customer)
                    REFERENCES tb_customers (pk_customer)
            );
            "#,
        );

        let orders = schema.get_table("tb_orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        let fk = &orders.foreign_keys[0];
        assert_eq!(fk.referenced_table, "tb_customers");
        assert_eq!(fk.column_names, vec!["fk_customer".to_string()]);
        assert!(orders.get_column("fk_customer").unwrap().is_foreign_key);
    }

    #[test]
    fn test_parse_inline_references() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_teams (pk_team BIGINT PRIMARY KEY);
            CREATE TABLE tb_players (
                pk_player BIGINT PRIMARY KEY,
                fk_team BIGINT REFERENCES tb_teams (pk_team)
            );
            "#,
        );
        let players = schema.get_table("tb_players").unwrap();
        assert_eq!(players.foreign_keys.len(), 1);
        assert_eq!(players.foreign_keys[0].referenced_table, "tb_teams");
    }

    #[test]
    fn test_parse_create_index() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_events (pk_event BIGINT PRIMARY KEY, occurred_at TIMESTAMPTZ);
            CREATE INDEX idx_events_occurred ON tb_events (occurred_at);
            CREATE UNIQUE INDEX idx_events_pk ON tb_events USING btree (pk_event);
            "#,
        );
        let events = schema.get_table("tb_events").unwrap();
        assert_eq!(events.indexes.len(), 2);
        assert!(!events.indexes[0].is_unique);
        assert!(events.indexes[1].is_unique);
        assert_eq!(events.indexes[1].index_type.as_deref(), Some("BTREE"));
    }

    #[test]
    fn test_parse_table_comment() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_machines (pk_machine BIGINT PRIMARY KEY);
            COMMENT ON TABLE tb_machines IS 'Factory machines; it''s the master list';
            "#,
        );
        let machines = schema.get_table("tb_machines").unwrap();
        assert_eq!(
            machines.comment.as_deref(),
            Some("Factory machines; it's the master list")
        );
    }

    #[test]
    fn test_parse_schema_qualified_name() {
        let schema = parse_sql("CREATE TABLE catalog.tb_parts (pk_part BIGINT PRIMARY KEY);");
        let parts = schema.get_table("tb_parts").unwrap();
        assert_eq!(parts.schema.as_deref(), Some("catalog"));
    }

    #[test]
    fn test_split_statements_respects_strings_and_comments() {
        let stmts = split_statements(
            "INSERT INTO t VALUES ('a;b'); -- trailing; comment\nSELECT 1; /* block; */ SELECT 2;",
        );
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].contains("'a;b'"));
    }

    #[test]
    fn test_split_statements_dollar_quoted() {
        let stmts = split_statements(
            "CREATE FUNCTION f() RETURNS void AS $$ BEGIN PERFORM 1; END; $$ LANGUAGE plpgsql; SELECT 1;",
        );
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("PERFORM 1;"));
    }

    #[test]
    fn test_composite_primary_key() {
        let schema = parse_sql(
            "CREATE TABLE tb_link (fk_a BIGINT, fk_b BIGINT, PRIMARY KEY (fk_a, fk_b));",
        );
        let link = schema.get_table("tb_link").unwrap();
        assert_eq!(link.primary_key.len(), 2);
        assert!(link.get_column("fk_a").unwrap().is_primary_key);
    }

    #[test]
    fn test_alter_table_add_foreign_key() {
        let schema = parse_sql(
            r#"
            CREATE TABLE tb_a (pk_a BIGINT PRIMARY KEY);
            CREATE TABLE tb_b (pk_b BIGINT PRIMARY KEY, fk_a BIGINT);
            ALTER TABLE tb_b ADD CONSTRAINT fk_b_a FOREIGN KEY (fk_a) REFERENCES tb_a (pk_a);
            "#,
        );
        let b = schema.get_table("tb_b").unwrap();
        assert_eq!(b.foreign_keys.len(), 1);
        assert_eq!(b.foreign_keys[0].name.as_deref(), Some("fk_b_a"));
    }

    #[test]
    fn test_unique_constraint_table_level() {
        let schema = parse_sql(
            "CREATE TABLE tb_slots (day DATE, room TEXT, CONSTRAINT uq_slot UNIQUE (day, room));",
        );
        let slots = schema.get_table("tb_slots").unwrap();
        assert_eq!(slots.unique_constraints.len(), 1);
        assert_eq!(slots.unique_constraints[0].columns.len(), 2);
    }
}
