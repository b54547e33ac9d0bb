//! Pair-wise comparison of seed data across environments.
//!
//! Order-independent on rows: the same data in a different order is not a
//! difference. Reports missing/extra tables, row-count mismatches, and
//! value-level differences.

use serde::Serialize;

use crate::seedcheck::extract::{SeedData, SeedRow};

/// Kind of difference between two environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DifferenceType {
    TableMissingInEnv2,
    TableExtraInEnv2,
    RowCountMismatch,
    ValueMismatch,
}

impl std::fmt::Display for DifferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DifferenceType::TableMissingInEnv2 => write!(f, "TABLE_MISSING_IN_ENV2"),
            DifferenceType::TableExtraInEnv2 => write!(f, "TABLE_EXTRA_IN_ENV2"),
            DifferenceType::RowCountMismatch => write!(f, "ROW_COUNT_MISMATCH"),
            DifferenceType::ValueMismatch => write!(f, "VALUE_MISMATCH"),
        }
    }
}

/// A single difference between two environments.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentDifference {
    pub table: String,
    pub difference_type: DifferenceType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env1_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env2_count: Option<usize>,
}

/// Compares seed data between two environments.
#[derive(Debug, Default)]
pub struct EnvironmentComparator;

impl EnvironmentComparator {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, env1: &SeedData, env2: &SeedData) -> Vec<EnvironmentDifference> {
        let mut differences = Vec::new();

        let mut all_tables: Vec<&String> = env1.keys().chain(env2.keys()).collect();
        all_tables.sort();
        all_tables.dedup();

        for table in all_tables {
            match (env1.get(table), env2.get(table)) {
                (None, Some(rows2)) => {
                    differences.push(EnvironmentDifference {
                        table: table.clone(),
                        difference_type: DifferenceType::TableExtraInEnv2,
                        message: format!(
                            "Table {} exists in environment 2 but not in environment 1",
                            table
                        ),
                        env1_count: None,
                        env2_count: Some(rows2.len()),
                    });
                }
                (Some(rows1), None) => {
                    differences.push(EnvironmentDifference {
                        table: table.clone(),
                        difference_type: DifferenceType::TableMissingInEnv2,
                        message: format!(
                            "Table {} exists in environment 1 but not in environment 2",
                            table
                        ),
                        env1_count: Some(rows1.len()),
                        env2_count: None,
                    });
                }
                (Some(rows1), Some(rows2)) => {
                    if rows1.len() != rows2.len() {
                        differences.push(EnvironmentDifference {
                            table: table.clone(),
                            difference_type: DifferenceType::RowCountMismatch,
                            message: format!(
                                "Table {} has {} rows in environment 1 but {} rows in \
                                 environment 2",
                                table,
                                rows1.len(),
                                rows2.len()
                            ),
                            env1_count: Some(rows1.len()),
                            env2_count: Some(rows2.len()),
                        });
                        continue;
                    }
                    differences.extend(self.compare_row_sets(table, rows1, rows2));
                }
                (None, None) => unreachable!(),
            }
        }

        differences
    }

    /// Compare equal-sized row sets, ignoring order.
    fn compare_row_sets(
        &self,
        table: &str,
        rows1: &[SeedRow],
        rows2: &[SeedRow],
    ) -> Vec<EnvironmentDifference> {
        let mut differences = Vec::new();

        let mut keys1: Vec<String> = rows1.iter().map(row_fingerprint).collect();
        let mut keys2: Vec<String> = rows2.iter().map(row_fingerprint).collect();
        keys1.sort();
        keys2.sort();

        if keys1 != keys2 {
            let only_in_1: Vec<&String> = keys1.iter().filter(|k| !keys2.contains(k)).collect();
            differences.push(EnvironmentDifference {
                table: table.to_string(),
                difference_type: DifferenceType::ValueMismatch,
                message: format!(
                    "Table {} has {} row(s) whose values differ between environments",
                    table,
                    only_in_1.len().max(1)
                ),
                env1_count: Some(rows1.len()),
                env2_count: Some(rows2.len()),
            });
        }

        differences
    }
}

impl EnvironmentDifference {
    /// Render as a report violation (environment drift is a warning, not a
    /// hard error).
    pub fn to_violation(&self) -> crate::seedcheck::report::Violation {
        crate::seedcheck::report::Violation::warning(
            "EnvironmentComparator",
            format!("[{}] {}", self.difference_type, self.message),
        )
        .with_table(self.table.clone())
    }
}

/// Canonical text form of a row for order-independent comparison.
fn row_fingerprint(row: &SeedRow) -> String {
    let mut parts: Vec<String> = row
        .iter()
        .map(|(column, value)| match value {
            Some(v) => format!("{}={}", column, v),
            None => format!("{}=\u{0}NULL", column),
        })
        .collect();
    parts.sort();
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seedcheck::extract::DataExtractor;

    #[test]
    fn test_identical_environments() {
        let data = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, 'Alice');");
        let differences = EnvironmentComparator::new().compare(&data, &data.clone());
        assert!(differences.is_empty());
    }

    #[test]
    fn test_order_independent() {
        let env1 = DataExtractor::new()
            .extract("INSERT INTO users (id) VALUES (1), (2);");
        let env2 = DataExtractor::new()
            .extract("INSERT INTO users (id) VALUES (2), (1);");
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert!(differences.is_empty());
    }

    #[test]
    fn test_table_missing_in_env2() {
        let env1 = DataExtractor::new().extract("INSERT INTO users (id) VALUES (1);");
        let env2 = SeedData::new();
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert_eq!(differences.len(), 1);
        assert_eq!(
            differences[0].difference_type,
            DifferenceType::TableMissingInEnv2
        );
        assert_eq!(differences[0].env1_count, Some(1));
    }

    #[test]
    fn test_table_extra_in_env2() {
        let env1 = SeedData::new();
        let env2 = DataExtractor::new().extract("INSERT INTO users (id) VALUES (1);");
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert_eq!(
            differences[0].difference_type,
            DifferenceType::TableExtraInEnv2
        );
    }

    #[test]
    fn test_row_count_mismatch() {
        let env1 = DataExtractor::new().extract("INSERT INTO users (id) VALUES (1), (2);");
        let env2 = DataExtractor::new().extract("INSERT INTO users (id) VALUES (1);");
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert_eq!(
            differences[0].difference_type,
            DifferenceType::RowCountMismatch
        );
        assert_eq!(differences[0].env1_count, Some(2));
        assert_eq!(differences[0].env2_count, Some(1));
    }

    #[test]
    fn test_value_mismatch() {
        let env1 = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, 'Alice');");
        let env2 = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, 'Bob');");
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].difference_type, DifferenceType::ValueMismatch);
    }

    #[test]
    fn test_null_vs_value_is_mismatch() {
        let env1 = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, NULL);");
        let env2 = DataExtractor::new()
            .extract("INSERT INTO users (id, name) VALUES (1, 'NULL');");
        let differences = EnvironmentComparator::new().compare(&env1, &env2);
        assert_eq!(differences.len(), 1);
    }
}
