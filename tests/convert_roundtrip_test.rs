//! Round-trip and boundary tests for the INSERT → COPY converter.
//!
//! The key invariant: for any convertible INSERT, the values parsed from
//! the original statement equal the values read back out of the generated
//! COPY block.

use confiture::seed::convert::{parse_values, InsertToCopyConverter, SqlValue};

/// Decode one COPY data line back into values (inverse of the formatter).
fn copy_line_to_values(line: &str) -> Vec<SqlValue> {
    line.split('\t')
        .map(|field| {
            if field == "\\N" {
                None
            } else {
                Some(
                    field
                        .replace("\\t", "\t")
                        .replace("\\n", "\n")
                        .replace("\\r", "\r")
                        .replace("\\\\", "\\"),
                )
            }
        })
        .collect()
}

fn roundtrip(insert: &str, row_values: &str) {
    let converter = InsertToCopyConverter::new();
    let result = converter.try_convert(insert, "case.sql");
    assert!(result.success, "not convertible: {:?}", result.reason);

    let copy = result.copy_format.unwrap();
    let data_lines: Vec<&str> = copy
        .lines()
        .skip(1)
        .take_while(|l| *l != "\\.")
        .collect();
    assert_eq!(data_lines.len(), 1);

    let expected = parse_values(row_values);
    let actual = copy_line_to_values(data_lines[0]);
    assert_eq!(expected, actual);
}

#[test]
fn test_roundtrip_simple_literals() {
    roundtrip(
        "INSERT INTO t (id, name, score) VALUES (1, 'Alice', 9.5);",
        "1, 'Alice', 9.5",
    );
}

#[test]
fn test_roundtrip_null_and_booleans() {
    roundtrip(
        "INSERT INTO t (id, active, note) VALUES (2, true, NULL);",
        "2, true, NULL",
    );
}

#[test]
fn test_roundtrip_escaped_quote() {
    roundtrip(
        "INSERT INTO t (id, note) VALUES (3, 'it''s here');",
        "3, 'it''s here'",
    );
}

#[test]
fn test_roundtrip_backslash_content() {
    roundtrip(
        r"INSERT INTO t (id, path) VALUES (4, 'C:\\temp');",
        r"4, 'C:\\temp'",
    );
}

#[test]
fn test_roundtrip_semicolon_inside_string() {
    roundtrip(
        "INSERT INTO t (id, v) VALUES (5, 'a;b');",
        "5, 'a;b'",
    );
}

#[test]
fn test_multi_statement_file_converts_every_insert() {
    let converter = InsertToCopyConverter::new();
    let sql = "INSERT INTO users (id) VALUES (1), (2);\n\
               INSERT INTO orders (id, note) VALUES (10, 'rush; handle first');\n\
               INSERT INTO orders (id, note) VALUES (11, NULL);";

    let result = converter.try_convert(sql, "seed.sql");
    assert!(result.success, "reason: {:?}", result.reason);
    assert_eq!(result.rows_converted, 4);

    let copy = result.copy_format.unwrap();
    assert_eq!(copy.matches("FROM stdin;").count(), 3);
    assert!(copy.contains("10\trush; handle first\n"));
    assert!(copy.contains("11\t\\N\n"));
}

#[test]
fn test_multi_row_count() {
    let converter = InsertToCopyConverter::new();
    let rows: Vec<String> = (1..=700).map(|i| format!("({}, 'row {}')", i, i)).collect();
    let insert = format!("INSERT INTO big (id, label) VALUES {};", rows.join(", "));

    let result = converter.try_convert(&insert, "big.sql");
    assert!(result.success);
    assert_eq!(result.rows_converted, 700);
}

#[test]
fn test_now_named_in_failure_reason() {
    let converter = InsertToCopyConverter::new();
    let result = converter.try_convert("INSERT INTO t (ts) VALUES (NOW());", "t.sql");
    assert!(!result.success);
    assert!(result.reason.unwrap().contains("NOW"));
}

#[test]
fn test_every_disqualifier_is_named() {
    let converter = InsertToCopyConverter::new();
    let cases = [
        ("INSERT INTO t (a) VALUES (1) ON CONFLICT DO NOTHING;", "ON CONFLICT"),
        ("INSERT INTO t (a) VALUES (1) RETURNING a;", "RETURNING"),
        ("WITH c AS (SELECT 1) INSERT INTO t (a) VALUES (1);", "CTE"),
        ("INSERT INTO t (a) VALUES ((SELECT 1));", "SELECT"),
        (
            "INSERT INTO t (a) VALUES (CASE WHEN true THEN 1 ELSE 0 END);",
            "CASE WHEN",
        ),
        ("INSERT INTO t (a) VALUES (CURRENT_DATE);", "CURRENT_"),
        ("INSERT INTO t (a) VALUES ('x' || 'y');", "||"),
        ("INSERT INTO t (a) VALUES (1 + 2);", "Arithmetic"),
        ("INSERT INTO t (a) VALUES (gen_random_uuid());", "gen_random_uuid"),
    ];
    for (sql, expected) in cases {
        let reason = converter
            .conversion_failure_reason(sql)
            .unwrap_or_else(|| panic!("expected rejection for: {}", sql));
        assert!(
            reason.contains(expected),
            "reason '{}' for '{}' should mention '{}'",
            reason,
            sql,
            expected
        );
    }
}

#[test]
fn test_batch_report_totals() {
    let converter = InsertToCopyConverter::new();
    let mut files = std::collections::BTreeMap::new();
    files.insert("a.sql".to_string(), "INSERT INTO t (x) VALUES (1);".to_string());
    files.insert("b.sql".to_string(), "INSERT INTO t (x) VALUES (2), (3);".to_string());
    files.insert(
        "c.sql".to_string(),
        "INSERT INTO t (x) VALUES (NOW());".to_string(),
    );

    let report = converter.convert_batch(&files);
    assert_eq!(report.total_files, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.results.len(), 3);
}
