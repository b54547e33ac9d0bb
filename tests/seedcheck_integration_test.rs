//! End-to-end orchestrator runs over seed and schema trees on disk.

use std::fs;
use std::path::{Path, PathBuf};

use confiture::seedcheck::{OrchestrationConfig, Orchestrator};

fn write_tree(root: &Path) -> (PathBuf, PathBuf) {
    let seeds = root.join("seeds");
    let schema = root.join("schema");
    fs::create_dir_all(seeds.join("10_base")).unwrap();
    fs::create_dir_all(&schema).unwrap();

    fs::write(
        schema.join("10_tables.sql"),
        r#"
        CREATE TABLE tb_customers (
            pk_customer UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE
        );
        CREATE TABLE tb_orders (
            pk_order UUID PRIMARY KEY,
            fk_customer UUID NOT NULL,
            total NUMERIC(10,2) NOT NULL,
            CONSTRAINT fk_orders_customer FOREIGN KEY (fk_customer)
                REFERENCES tb_customers (pk_customer)
        );
        "#,
    )
    .unwrap();
    fs::write(
        schema.join("20_functions.sql"),
        r#"
        CREATE OR REPLACE FUNCTION fn_resolve_customers() RETURNS void AS $$
        BEGIN
            PERFORM 1;
        END;
        $$ LANGUAGE plpgsql;
        CREATE OR REPLACE FUNCTION fn_resolve_orders() RETURNS void AS $$
        BEGIN
            PERFORM 1;
        END;
        $$ LANGUAGE plpgsql;
        "#,
    )
    .unwrap();

    fs::write(
        seeds.join("10_base").join("01_customers.sql"),
        "INSERT INTO tb_customers (pk_customer, email) VALUES \
         ('123e4567-e89b-12d3-a456-426614174000', 'alice@example.com'), \
         ('123e4567-e89b-12d3-a456-426614174001', 'bob@example.com');",
    )
    .unwrap();
    fs::write(
        seeds.join("10_base").join("02_orders.sql"),
        "INSERT INTO tb_orders (pk_order, fk_customer, total) VALUES \
         ('123e4567-e89b-12d3-a456-426614174100', \
          '123e4567-e89b-12d3-a456-426614174000', 19.90);",
    )
    .unwrap();

    (seeds, schema)
}

#[test]
fn test_clean_tree_passes_through_level_3() {
    let tmp = tempfile::tempdir().unwrap();
    let (seeds, schema) = write_tree(tmp.path());

    let report = Orchestrator::new(OrchestrationConfig {
        max_level: 3,
        seeds_dir: seeds,
        schema_dir: Some(schema),
        ..Default::default()
    })
    .run()
    .unwrap();

    assert_eq!(report.max_level_reached, 3);
    assert!(!report.has_errors(), "{:?}", report.violations);
    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.tables_scanned, 2);
    assert!(!report.stopped_early);
}

#[test]
fn test_broken_fk_reference_caught_at_level_2() {
    let tmp = tempfile::tempdir().unwrap();
    let (seeds, schema) = write_tree(tmp.path());
    fs::write(
        seeds.join("10_base").join("03_bad_orders.sql"),
        "INSERT INTO tb_orders (pk_order, fk_customer, total) VALUES \
         ('123e4567-e89b-12d3-a456-426614174200', \
          '123e4567-e89b-12d3-a456-426614179999', 5.00);",
    )
    .unwrap();

    let report = Orchestrator::new(OrchestrationConfig {
        max_level: 3,
        seeds_dir: seeds,
        schema_dir: Some(schema),
        stop_on_critical: true,
        ..Default::default()
    })
    .run()
    .unwrap();

    assert!(report.has_errors());
    assert!(report
        .violations
        .iter()
        .any(|v| v.rule == "ForeignKey" && v.message.contains("426614179999")));
    // The FK error is critical, so level 3 never runs
    assert!(report.stopped_early);
    assert_eq!(report.max_level_reached, 2);
}

#[test]
fn test_duplicate_unique_email_caught() {
    let tmp = tempfile::tempdir().unwrap();
    let (seeds, schema) = write_tree(tmp.path());
    fs::write(
        seeds.join("10_base").join("03_dup.sql"),
        "INSERT INTO tb_customers (pk_customer, email) VALUES \
         ('123e4567-e89b-12d3-a456-426614174002', 'alice@example.com');",
    )
    .unwrap();

    let report = Orchestrator::new(OrchestrationConfig {
        max_level: 2,
        seeds_dir: seeds,
        schema_dir: Some(schema),
        stop_on_critical: false,
        ..Default::default()
    })
    .run()
    .unwrap();

    assert!(report
        .violations
        .iter()
        .any(|v| v.rule == "Unique" && v.message.contains("alice@example.com")));
}

#[test]
fn test_report_serialises_to_all_formats() {
    let tmp = tempfile::tempdir().unwrap();
    let (seeds, schema) = write_tree(tmp.path());

    let report = Orchestrator::new(OrchestrationConfig {
        max_level: 2,
        seeds_dir: seeds,
        schema_dir: Some(schema),
        ..Default::default()
    })
    .run()
    .unwrap();

    let text = report.to_text();
    assert!(text.contains("Validators run"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert!(json["validators_run"].is_array());

    let csv = report.to_csv();
    assert!(csv.starts_with("severity,rule"));
}

#[test]
fn test_missing_seeds_dir_is_usage_error() {
    let err = Orchestrator::new(OrchestrationConfig {
        max_level: 1,
        seeds_dir: PathBuf::from("/no/such/seeds"),
        ..Default::default()
    })
    .run()
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
