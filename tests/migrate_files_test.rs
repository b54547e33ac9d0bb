//! Migration file discovery, duplicate enforcement, and orphan handling.

use std::fs;

use confiture::error::ConfitureError;
use confiture::migrate::{
    ensure_no_duplicate_versions, find_duplicate_versions, find_migration_files,
    find_orphan_sql_files,
};

#[test]
fn test_reading_directory_twice_yields_identical_ordering() {
    let tmp = tempfile::tempdir().unwrap();
    for name in [
        "003_third.up.sql",
        "001_first.up.sql",
        "002_second.up.sql",
        "001_first.down.sql",
    ] {
        fs::write(tmp.path().join(name), "SELECT 1;").unwrap();
    }

    let first = find_migration_files(tmp.path());
    let second = find_migration_files(tmp.path());
    assert_eq!(first, second);

    let versions: Vec<&str> = first.iter().map(|f| f.version.as_str()).collect();
    assert_eq!(versions, vec!["001", "002", "003"]);
}

#[test]
fn test_duplicate_version_exits_3_with_itemised_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("003_one.up.sql"), "").unwrap();
    fs::write(tmp.path().join("003_two.up.sql"), "").unwrap();

    let err = ensure_no_duplicate_versions(tmp.path()).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    match err {
        ConfitureError::MigrationConflict {
            message,
            conflicting_files,
        } => {
            assert!(message.contains("003"));
            assert_eq!(conflicting_files.len(), 2);
        }
        other => panic!("expected MigrationConflict, got {:?}", other),
    }
}

#[test]
fn test_orphans_reported_but_not_discovered() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("001_real.up.sql"), "").unwrap();
    fs::write(tmp.path().join("003_x.sql"), "").unwrap();

    // Ignored by discovery (so ignored by apply)
    let files = find_migration_files(tmp.path());
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].version, "001");

    // Reported by the orphan scan (so reported by validate)
    let orphans = find_orphan_sql_files(tmp.path());
    assert_eq!(orphans.len(), 1);
    assert!(orphans[0].ends_with("003_x.sql"));

    // Never a duplicate-version error
    assert!(ensure_no_duplicate_versions(tmp.path()).is_ok());
    assert!(find_duplicate_versions(tmp.path()).is_empty());
}

#[test]
fn test_down_file_without_up_is_not_a_migration() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("004_lonely.down.sql"), "").unwrap();

    assert!(find_migration_files(tmp.path()).is_empty());
    // A bare .down.sql matches the pair naming, so it is not an orphan
    assert!(find_orphan_sql_files(tmp.path()).is_empty());
}

#[test]
fn test_loaded_pair_carries_both_directions() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("002_add_flags.up.sql"),
        "ALTER TABLE tb_users ADD COLUMN flags INT;",
    )
    .unwrap();
    fs::write(
        tmp.path().join("002_add_flags.down.sql"),
        "ALTER TABLE tb_users DROP COLUMN flags;",
    )
    .unwrap();

    let migration = find_migration_files(tmp.path())[0].load().unwrap();
    assert_eq!(migration.version, "002");
    assert_eq!(migration.name, "add_flags");
    assert!(migration.up_sql.contains("ADD COLUMN"));
    assert!(migration.down_sql.unwrap().contains("DROP COLUMN"));
    assert!(migration.source_path.unwrap().ends_with("002_add_flags.up.sql"));
}

#[test]
fn test_missing_directory_yields_empty_sets() {
    let missing = std::path::Path::new("/no/such/migrations");
    assert!(find_migration_files(missing).is_empty());
    assert!(find_orphan_sql_files(missing).is_empty());
    assert!(ensure_no_duplicate_versions(missing).is_ok());
}
