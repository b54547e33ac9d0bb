//! Level 1: static seed file validation.
//!
//! Checks prep-seed files without touching a database:
//! - INSERTs must target the prep_seed schema, not final tables
//! - `fk_*` columns must carry the `_id` suffix
//! - UUID-shaped literals must be valid RFC 4122 form
//! - UNION branches must agree on column count and NULL typing

use once_cell::sync::Lazy;
use regex::Regex;

use crate::seedcheck::report::Violation;

static INSERT_TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)INSERT\s+INTO\s+(\w+)\.(\w+)").unwrap());
static INSERT_COLUMNS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)INSERT\s+INTO\s+prep_seed\.\w+\s*\((.*?)\)\s*VALUES").unwrap()
});
static VALUES_ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)VALUES\s*\((.*?)\)").unwrap());
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']*)'").unwrap());
static VALID_UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static UNION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bUNION\s+(?:ALL\s+)?").unwrap());
static UNION_QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(SELECT\s+[^;]+?\s+UNION\s+(?:ALL\s+)?SELECT\s+[^;]+)").unwrap()
});
static SELECT_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*SELECT\s+").unwrap());
static SELECT_TAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s+(FROM|WHERE|GROUP|HAVING|ORDER|LIMIT).*$").unwrap()
});
static NULL_CAST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^NULL(?:::(\w+(?:\(\d+(?:,\s*\d+)?\))?))?$").unwrap()
});

/// Static validator for prep-seed files.
#[derive(Debug, Default)]
pub struct Level1SeedValidator;

impl Level1SeedValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one seed file.
    pub fn validate_seed_file(&self, sql: &str, file_path: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        violations.extend(self.validate_schema_target(sql, file_path));
        violations.extend(self.validate_fk_naming(sql, file_path));
        violations.extend(self.validate_uuid_format(sql, file_path));
        violations.extend(self.validate_union_type_consistency(sql, file_path));
        violations
    }

    /// INSERTs with an explicit schema must target prep_seed.
    fn validate_schema_target(&self, sql: &str, file_path: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for caps in INSERT_TARGET_RE.captures_iter(sql) {
            let schema = caps.get(1).unwrap().as_str();
            if schema.eq_ignore_ascii_case("prep_seed") {
                continue;
            }
            let line = line_of(sql, caps.get(0).unwrap().start());
            violations.push(
                Violation::error(
                    "PrepSeedTarget",
                    format!(
                        "Seed INSERT targets {} schema but should target prep_seed",
                        schema
                    ),
                )
                .with_file(file_path)
                .with_line(line)
                .with_suggestion(format!(
                    "Change INSERT INTO {}. to INSERT INTO prep_seed.",
                    schema
                )),
            );
        }
        violations
    }

    /// `fk_*` columns must end in `_id`.
    fn validate_fk_naming(&self, sql: &str, file_path: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for caps in INSERT_COLUMNS_RE.captures_iter(sql) {
            let line = line_of(sql, caps.get(0).unwrap().start());
            for column in caps.get(1).unwrap().as_str().split(',') {
                let column = column.trim().trim_matches('"');
                let lower = column.to_lowercase();
                if lower.starts_with("fk_") && !lower.ends_with("_id") {
                    violations.push(
                        Violation::warning(
                            "FkNaming",
                            format!(
                                "FK column '{}' missing _id suffix (should be '{}_id')",
                                column, column
                            ),
                        )
                        .with_file(file_path)
                        .with_line(line)
                        .with_column(column)
                        .with_suggestion(format!("Rename column to '{}_id'", column)),
                    );
                }
            }
        }
        violations
    }

    /// Quoted strings that look like UUID attempts must be valid UUIDs.
    fn validate_uuid_format(&self, sql: &str, file_path: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for values in VALUES_ROW_RE.captures_iter(sql) {
            let line = line_of(sql, values.get(0).unwrap().start());
            for quoted in QUOTED_RE.captures_iter(values.get(1).unwrap().as_str()) {
                let value = quoted.get(1).unwrap().as_str();
                if !looks_like_uuid(value) {
                    continue;
                }
                if !VALID_UUID_RE.is_match(&value.to_lowercase()) {
                    violations.push(
                        Violation::error(
                            "UuidFormat",
                            format!(
                                "Invalid UUID format: '{}' (expected: 8-4-4-4-12 hex digits)",
                                value
                            ),
                        )
                        .with_file(file_path)
                        .with_line(line)
                        .with_suggestion("Use valid UUID format (see RFC 4122)"),
                    );
                }
            }
        }
        violations
    }

    /// UNION branches must agree on column count and NULL typing.
    fn validate_union_type_consistency(&self, sql: &str, file_path: &str) -> Vec<Violation> {
        let mut violations = Vec::new();

        // Fast path: no UNION anywhere
        if !UNION_RE.is_match(sql) {
            return violations;
        }

        for caps in UNION_QUERY_RE.captures_iter(sql) {
            let query = caps.get(1).unwrap().as_str();
            let line = line_of(sql, caps.get(0).unwrap().start());

            let branches: Vec<&str> = UNION_RE.split(query).collect();
            if branches.len() < 2 {
                continue;
            }

            let base_columns = extract_select_columns(branches[0]);

            for (branch_index, branch) in branches.iter().enumerate().skip(1) {
                let branch_number = branch_index + 1;
                let branch_columns = extract_select_columns(branch);

                if branch_columns.len() != base_columns.len() {
                    violations.push(
                        Violation::error(
                            "UnionTypeMismatch",
                            format!(
                                "UNION branch {} has {} columns but base branch has {} columns",
                                branch_number,
                                branch_columns.len(),
                                base_columns.len()
                            ),
                        )
                        .with_file(file_path)
                        .with_line(line)
                        .with_suggestion("Ensure all UNION branches have same column count"),
                    );
                    continue;
                }

                for (column_index, (base, branch)) in
                    base_columns.iter().zip(branch_columns.iter()).enumerate()
                {
                    if let Some(mismatch) = detect_null_type_mismatch(base, branch) {
                        violations.push(
                            Violation::error(
                                "UnionTypeMismatch",
                                format!(
                                    "UNION branch {} column {}: {}",
                                    branch_number,
                                    column_index + 1,
                                    mismatch
                                ),
                            )
                            .with_file(file_path)
                            .with_line(line)
                            .with_suggestion(format!(
                                "Change '{}' to '{}' for type consistency",
                                branch.trim(),
                                base.trim()
                            )),
                        );
                    }
                }
            }
        }

        violations
    }
}

fn line_of(sql: &str, byte_offset: usize) -> usize {
    sql[..byte_offset].matches('\n').count() + 1
}

/// Hyphens or a long hex run mark a UUID attempt.
fn looks_like_uuid(value: &str) -> bool {
    (value.contains('-') && value.len() >= 32)
        || (value.len() >= 32 && value.chars().all(|c| c.is_ascii_hexdigit() || c == '-'))
}

/// Column expressions from a SELECT clause, respecting nested parentheses.
fn extract_select_columns(select_clause: &str) -> Vec<String> {
    let clause = SELECT_PREFIX_RE.replace(select_clause.trim(), "");
    let clause = SELECT_TAIL_RE.replace(&clause, "");

    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0;

    for c in clause.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let column = current.trim().to_string();
                if !column.is_empty() {
                    columns.push(column);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let column = current.trim().to_string();
    if !column.is_empty() {
        columns.push(column);
    }
    columns
}

/// Detect the NULL vs NULL::type mismatch pattern.
fn detect_null_type_mismatch(col1: &str, col2: &str) -> Option<String> {
    let caps1 = NULL_CAST_RE.captures(col1.trim())?;
    let caps2 = NULL_CAST_RE.captures(col2.trim())?;

    let type1 = caps1.get(1).map(|m| m.as_str());
    let type2 = caps2.get(1).map(|m| m.as_str());

    match (type1, type2) {
        (None, Some(t)) | (Some(t), None) => {
            Some(format!("NULL type mismatch: 'NULL' vs 'NULL::{}'", t))
        }
        (Some(t1), Some(t2)) if !t1.eq_ignore_ascii_case(t2) => {
            Some(format!("NULL type mismatch: 'NULL::{}' vs 'NULL::{}'", t1, t2))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(sql: &str) -> Vec<Violation> {
        Level1SeedValidator::new().validate_seed_file(sql, "test.sql")
    }

    #[test]
    fn test_prep_seed_target_ok() {
        let violations = validate("INSERT INTO prep_seed.tb_users (id) VALUES ('x');");
        assert!(violations.iter().all(|v| v.rule != "PrepSeedTarget"));
    }

    #[test]
    fn test_wrong_schema_target() {
        let violations = validate("INSERT INTO catalog.tb_users (id) VALUES (1);");
        let target: Vec<_> = violations
            .iter()
            .filter(|v| v.rule == "PrepSeedTarget")
            .collect();
        assert_eq!(target.len(), 1);
        assert!(target[0].message.contains("catalog"));
        assert_eq!(target[0].line, Some(1));
    }

    #[test]
    fn test_unqualified_insert_not_flagged() {
        let violations = validate("INSERT INTO tb_users (id) VALUES (1);");
        assert!(violations.iter().all(|v| v.rule != "PrepSeedTarget"));
    }

    #[test]
    fn test_fk_naming_missing_suffix() {
        let violations = validate(
            "INSERT INTO prep_seed.tb_orders (fk_customer, total) VALUES ('c-1', 10);",
        );
        let fk: Vec<_> = violations.iter().filter(|v| v.rule == "FkNaming").collect();
        assert_eq!(fk.len(), 1);
        assert!(fk[0].message.contains("fk_customer_id"));
    }

    #[test]
    fn test_fk_naming_with_suffix_ok() {
        let violations = validate(
            "INSERT INTO prep_seed.tb_orders (fk_customer_id, total) VALUES ('c-1', 10);",
        );
        assert!(violations.iter().all(|v| v.rule != "FkNaming"));
    }

    #[test]
    fn test_invalid_uuid_flagged() {
        let violations = validate(
            "INSERT INTO prep_seed.tb_users (pk) VALUES \
             ('123e4567-e89b-12d3-a456-42661417400');",
        );
        let uuid: Vec<_> = violations.iter().filter(|v| v.rule == "UuidFormat").collect();
        assert_eq!(uuid.len(), 1);
    }

    #[test]
    fn test_valid_uuid_passes() {
        let violations = validate(
            "INSERT INTO prep_seed.tb_users (pk) VALUES \
             ('123e4567-e89b-12d3-a456-426614174000');",
        );
        assert!(violations.iter().all(|v| v.rule != "UuidFormat"));
    }

    #[test]
    fn test_ordinary_strings_not_uuid_checked() {
        let violations =
            validate("INSERT INTO prep_seed.tb_users (name) VALUES ('Alice Smith');");
        assert!(violations.iter().all(|v| v.rule != "UuidFormat"));
    }

    #[test]
    fn test_union_column_count_mismatch() {
        let violations = validate(
            "INSERT INTO prep_seed.tb_x (a, b)\n\
             SELECT 'one', 'two' UNION ALL SELECT 'three';",
        );
        let union: Vec<_> = violations
            .iter()
            .filter(|v| v.rule == "UnionTypeMismatch")
            .collect();
        assert_eq!(union.len(), 1);
        assert!(union[0].message.contains("1 columns"));
    }

    #[test]
    fn test_union_null_typing_mismatch() {
        let violations = validate(
            "SELECT 'a', NULL::text UNION ALL SELECT 'b', NULL;",
        );
        let union: Vec<_> = violations
            .iter()
            .filter(|v| v.rule == "UnionTypeMismatch")
            .collect();
        assert_eq!(union.len(), 1);
        assert!(union[0].message.contains("NULL type mismatch"));
    }

    #[test]
    fn test_union_consistent_passes() {
        let violations = validate(
            "SELECT 'a', NULL::text UNION ALL SELECT 'b', NULL::text;",
        );
        assert!(violations.iter().all(|v| v.rule != "UnionTypeMismatch"));
    }

    #[test]
    fn test_no_union_fast_path() {
        let violations = validate("INSERT INTO prep_seed.tb_x (a) VALUES ('v');");
        assert!(violations.iter().all(|v| v.rule != "UnionTypeMismatch"));
    }
}
