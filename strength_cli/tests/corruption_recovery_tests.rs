//! Corruption recovery tests for the lift binary.
//!
//! These tests verify the system can handle:
//! - A corrupted store file (commands fail, the file is left untouched)
//! - A missing store file (treated as empty)
//! - Stray temp files from an interrupted write
//! - A failed command leaving no partial writes

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const DEMO_PROGRAM: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/three_day_waves.toml");

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("lift"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_corrupted_store_is_reported_and_preserved() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let store_path = data_dir.join("store.json");
    let garbage = "{ invalid json }}}}";
    fs::write(&store_path, garbage).expect("Failed to write corrupted store");

    cli()
        .arg("import")
        .arg(DEMO_PROGRAM)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt store file"));

    cli()
        .arg("dashboard")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure();

    // Nothing overwrote the damaged file
    assert_eq!(fs::read_to_string(&store_path).unwrap(), garbage);
}

#[test]
fn test_truncated_store_fails_cleanly() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("import")
        .arg(DEMO_PROGRAM)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    // Simulate a torn write from some other tool
    let store_path = data_dir.join("store.json");
    let contents = fs::read_to_string(&store_path).unwrap();
    fs::write(&store_path, &contents[..contents.len() / 2]).unwrap();

    cli()
        .arg("programs")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("store error"));
}

#[test]
fn test_missing_store_starts_empty() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("fresh");

    cli()
        .arg("programs")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("No programs imported."));

    // Reads never create the store
    assert!(!data_dir.join("store.json").exists());
}

#[test]
fn test_stray_temp_file_is_ignored() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("import")
        .arg(DEMO_PROGRAM)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    // Leftover from a write that died before the rename
    fs::write(data_dir.join(".tmpAbC123"), "{ partial").unwrap();

    cli()
        .arg("programs")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("three-day-waves"));
}

#[test]
fn test_failed_command_writes_nothing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("import")
        .arg(DEMO_PROGRAM)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();
    let store_path = data_dir.join("store.json");
    let before = fs::read_to_string(&store_path).unwrap();

    // Non-positive maxes are rejected before the store is touched
    cli()
        .args(["max", "record", "squat", "0"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure();

    // Duplicate import fails inside the transaction
    cli()
        .arg("import")
        .arg(DEMO_PROGRAM)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(&store_path).unwrap(), before);
}
