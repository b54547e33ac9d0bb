//! Integration tests for the schema builder driven by a real environment
//! config on disk.
//!
//! Covers:
//! - Environment::load + SchemaBuilder end-to-end
//! - Deterministic ordering across repeated scans
//! - Comment validation failure modes
//! - Separator configuration via YAML
//! - Hash equals the written artifact

use std::fs;
use std::path::Path;

use confiture::builder::{hash_schema, SchemaBuilder};
use confiture::config::Environment;

fn write_project(root: &Path, build_section: &str) {
    let envs = root.join("db").join("environments");
    let schema = root.join("db").join("schema");
    let seeds = root.join("db").join("seeds");
    fs::create_dir_all(&envs).unwrap();
    fs::create_dir_all(&schema).unwrap();
    fs::create_dir_all(&seeds).unwrap();

    fs::write(
        envs.join("local.yaml"),
        format!(
            "database_url: postgresql://localhost/app\ninclude_dirs:\n  - db\n{}",
            build_section
        ),
    )
    .unwrap();

    fs::write(
        schema.join("10_tables.sql"),
        "CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY);\n",
    )
    .unwrap();
    fs::write(
        schema.join("20_views.sql"),
        "CREATE VIEW v_users AS SELECT * FROM tb_users;\n",
    )
    .unwrap();
    fs::write(
        seeds.join("01_users.sql"),
        "INSERT INTO tb_users (pk_user) VALUES (1);\n",
    )
    .unwrap();
}

#[test]
fn test_build_from_environment_config() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), "");

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());

    let built = builder.build(false, None, false).unwrap();
    assert!(built.contains("CREATE TABLE tb_users"));
    assert!(built.contains("CREATE VIEW v_users"));
    assert!(built.contains("INSERT INTO tb_users"));

    // Tables come before views (filename ordering within the group)
    assert!(built.find("CREATE TABLE").unwrap() < built.find("CREATE VIEW").unwrap());
}

#[test]
fn test_schema_only_excludes_seed_tree() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), "");

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());

    let built = builder.build(true, None, false).unwrap();
    assert!(built.contains("CREATE TABLE tb_users"));
    assert!(!built.contains("INSERT INTO tb_users"));
}

#[test]
fn test_repeated_scans_are_identical() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), "");

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());

    let first = builder.build(false, None, false).unwrap();
    let second = builder.build(false, None, false).unwrap();
    assert_eq!(first, second);
    assert_eq!(hash_schema(&first), hash_schema(&second));
}

#[test]
fn test_unclosed_comment_fails_build() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), "");
    fs::write(
        tmp.path().join("db").join("schema").join("99_bad.sql"),
        "/* spillover into the next file",
    )
    .unwrap();

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());
    let err = builder.build(false, None, false).unwrap_err();
    let message = err.to_string().to_lowercase();
    assert!(message.contains("unclosed") || message.contains("comment"));
}

#[test]
fn test_disabled_validation_in_yaml_allows_spillover() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(
        tmp.path(),
        "build:\n  validate_comments:\n    enabled: false\n",
    );
    fs::write(
        tmp.path().join("db").join("schema").join("99_bad.sql"),
        "/* spillover",
    )
    .unwrap();

    let env = Environment::load("local", tmp.path()).unwrap();
    assert!(!env.build.validate_comments.enabled);
    let builder = SchemaBuilder::new(&env, tmp.path());
    assert!(builder.build(false, None, false).is_ok());
}

#[test]
fn test_line_comment_separator_from_yaml() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(
        tmp.path(),
        "build:\n  separators:\n    style: line_comment\n",
    );

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());
    let built = builder.build(true, None, false).unwrap();
    assert!(built.contains("-- ====="));
    assert!(!built.contains("/* ====="));
}

#[test]
fn test_hash_matches_written_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), "");

    let env = Environment::load("local", tmp.path()).unwrap();
    let builder = SchemaBuilder::new(&env, tmp.path());

    let out = tmp.path().join("artifact.sql");
    let built = builder.build(false, Some(&out), false).unwrap();
    let on_disk = fs::read_to_string(&out).unwrap();
    assert_eq!(built, on_disk);
    assert_eq!(builder.compute_hash(false).unwrap(), hash_schema(&on_disk));
}

#[test]
fn test_missing_environment_is_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = Environment::load("nope", tmp.path()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
