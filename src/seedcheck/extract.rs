//! Seed data extraction.
//!
//! Parses INSERT statements out of seed SQL into a table → rows map that
//! the consistency validators and the environment comparator consume.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfitureError;
use crate::schema::split_statements;
use crate::seed::convert::{parse_values, SqlValue};

/// Rows of one table: column name → literal value (None = NULL).
pub type SeedRow = BTreeMap<String, SqlValue>;

/// All extracted seed data, keyed by table name.
pub type SeedData = BTreeMap<String, Vec<SeedRow>>;

static INSERT_HEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^\s*INSERT\s+INTO\s+([\w.]+)\s*\(([^)]+)\)\s*VALUES\s*(.+)$"#).unwrap()
});

/// Extracts seed rows from SQL text and files.
#[derive(Debug, Default)]
pub struct DataExtractor;

impl DataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract rows from one SQL string, merging into `data`.
    pub fn extract_into(&self, sql: &str, data: &mut SeedData) {
        for statement in split_statements(sql) {
            let Some(caps) = INSERT_HEAD_RE.captures(&statement) else {
                continue;
            };

            let table = normalize_table_name(caps.get(1).unwrap().as_str());
            let columns: Vec<String> = caps
                .get(2)
                .unwrap()
                .as_str()
                .split(',')
                .map(|c| c.trim().trim_matches('"').to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let values_clause = caps.get(3).unwrap().as_str();

            let rows = data.entry(table).or_default();
            for row_body in split_rows(values_clause) {
                let values = parse_values(&row_body);
                if values.len() != columns.len() {
                    continue;
                }
                let row: SeedRow = columns.iter().cloned().zip(values).collect();
                rows.push(row);
            }
        }
    }

    /// Extract rows from one SQL string.
    pub fn extract(&self, sql: &str) -> SeedData {
        let mut data = SeedData::new();
        self.extract_into(sql, &mut data);
        data
    }

    /// Extract rows from every `.sql` file under a directory tree.
    pub fn extract_dir(&self, dir: &Path) -> Result<(SeedData, usize), ConfitureError> {
        let mut data = SeedData::new();
        let mut files_scanned = 0;
        self.walk(dir, &mut data, &mut files_scanned)?;
        Ok((data, files_scanned))
    }

    fn walk(
        &self,
        dir: &Path,
        data: &mut SeedData,
        files_scanned: &mut usize,
    ) -> Result<(), ConfitureError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            ConfitureError::Validation(format!("Cannot read {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.walk(&path, data, files_scanned)?;
            } else if path.extension().map(|e| e == "sql").unwrap_or(false) {
                let sql = fs::read_to_string(&path).map_err(|e| {
                    ConfitureError::Validation(format!("Cannot read {}: {}", path.display(), e))
                })?;
                self.extract_into(&sql, data);
                *files_scanned += 1;
            }
        }
        Ok(())
    }
}

/// Strip a schema qualifier: `prep_seed.tb_users` → `tb_users`.
pub fn normalize_table_name(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

/// Split a VALUES clause into row bodies, quote-aware.
fn split_rows(values_clause: &str) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut in_string = false;
    let chars: Vec<char> = values_clause.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '\'' && (i == 0 || chars[i - 1] != '\\') {
            in_string = !in_string;
        }
        if !in_string {
            if c == '(' {
                depth += 1;
                if depth == 1 {
                    current.clear();
                    continue;
                }
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    rows.push(current.clone());
                    continue;
                }
            }
        }
        if depth >= 1 {
            current.push(c);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_insert() {
        let data = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob');");
        let rows = &data["users"];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Some("1".to_string()));
        assert_eq!(rows[1]["name"], Some("Bob".to_string()));
    }

    #[test]
    fn test_extract_null_values() {
        let data = DataExtractor::new()
            .extract("INSERT INTO users (id, nickname) VALUES (1, NULL);");
        assert_eq!(data["users"][0]["nickname"], None);
    }

    #[test]
    fn test_extract_strips_schema_qualifier() {
        let data = DataExtractor::new()
            .extract("INSERT INTO prep_seed.tb_users (id) VALUES ('u-1');");
        assert!(data.contains_key("tb_users"));
    }

    #[test]
    fn test_extract_merges_multiple_statements() {
        let sql = "INSERT INTO t (id) VALUES (1);\nINSERT INTO t (id) VALUES (2);";
        let data = DataExtractor::new().extract(sql);
        assert_eq!(data["t"].len(), 2);
    }

    #[test]
    fn test_non_insert_statements_ignored() {
        let data = DataExtractor::new()
            .extract("CREATE TABLE t (id INT);\nSELECT * FROM t;");
        assert!(data.is_empty());
    }

    #[test]
    fn test_mismatched_column_count_skipped() {
        let data = DataExtractor::new()
            .extract("INSERT INTO t (a, b) VALUES (1);");
        assert!(data.get("t").map(|rows| rows.is_empty()).unwrap_or(true));
    }

    #[test]
    fn test_extract_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("01_users.sql"),
            "INSERT INTO users (id) VALUES (1);",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("02_orders.sql"),
            "INSERT INTO orders (id, user_id) VALUES (10, 1);",
        )
        .unwrap();

        let (data, files) = DataExtractor::new().extract_dir(tmp.path()).unwrap();
        assert_eq!(files, 2);
        assert_eq!(data.len(), 2);
        assert_eq!(data["orders"][0]["user_id"], Some("1".to_string()));
    }
}
