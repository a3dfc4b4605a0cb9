//! Integration tests for the lift binary.
//!
//! These tests drive the full workflow against a temporary data directory:
//! - Program import and enrollment
//! - Max recording and day resolution
//! - Session logging, completion and progression
//! - Ledger history and CSV export

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DEMO_PROGRAM: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/three_day_waves.toml");

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("lift"))
}

/// Run a command against `data_dir` and expect success
fn run(data_dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    cli().args(args).arg("--data-dir").arg(data_dir).assert().success()
}

/// Import the demo program, enroll, and record training maxes
fn enrolled(data_dir: &Path) {
    run(data_dir, &["import", DEMO_PROGRAM]);
    run(data_dir, &["enroll", "three-day-waves"]);
    run(data_dir, &["max", "record", "squat", "200", "--date", "2024-06-01"]);
    run(data_dir, &["max", "record", "bench", "100", "--date", "2024-06-01"]);
    run(data_dir, &["max", "record", "deadlift", "240", "--date", "2024-06-01"]);
}

/// Log `count` sets of `lift` at `weight` x `reps`
fn log_sets(data_dir: &Path, lift: &str, weight: &str, reps: &str, count: usize) {
    for _ in 0..count {
        run(data_dir, &["log", lift, weight, reps, "--target", reps]);
    }
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Strength training program engine"));
}

#[test]
fn test_import_creates_store() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    run(data_dir, &["import", DEMO_PROGRAM])
        .stdout(predicate::str::contains("Imported 'Three Day Waves'"))
        .stdout(predicate::str::contains("3 days, 3 weeks, 2 progressions"));

    assert!(data_dir.join("store.json").exists());

    run(data_dir, &["programs"]).stdout(predicate::str::contains("three-day-waves"));
}

#[test]
fn test_duplicate_import_is_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    run(data_dir, &["import", DEMO_PROGRAM]);
    cli()
        .args(["import", DEMO_PROGRAM])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure();
}

#[test]
fn test_invalid_bundle_reports_problems() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let bundle = data_dir.join("broken.toml");
    fs::write(
        &bundle,
        r#"
[program]
name = "Broken"
slug = "broken"

[cycle]
name = "One week"
length_weeks = 1

[[days]]
slug = "day"
name = "Day"

[[days.prescriptions]]
lift = "missing-lift"
load = { type = "fixed_weight", weight = 60.0 }
scheme = { type = "fixed", sets = 3, reps = 5 }

[[weeks]]
number = 1
days = { monday = "day" }
"#,
    )
    .unwrap();

    cli()
        .arg("import")
        .arg(&bundle)
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing-lift"));
}

#[test]
fn test_today_requires_enrollment() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("today")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not enrolled"));
}

#[test]
fn test_today_resolves_first_day() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["today"])
        .stdout(predicate::str::contains("Squat Day"))
        .stdout(predicate::str::contains("Squat: 5 x 3 @ 170"))
        .stdout(predicate::str::contains("Barbell Row: 3 x 10 @ 60"));
}

#[test]
fn test_today_reports_missing_max_as_gap() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    run(data_dir, &["import", DEMO_PROGRAM]);
    run(data_dir, &["enroll", "three-day-waves"]);

    // Row is fixed weight and still resolves
    run(data_dir, &["today"])
        .stdout(predicate::str::contains("Barbell Row: 3 x 10 @ 60"))
        .stdout(predicate::str::contains("Squat: no training_max recorded"));
}

#[test]
fn test_today_json() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    let output = cli()
        .args(["today", "--json"])
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .unwrap();
    assert!(output.status.success());

    let day: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(day["day_slug"], "squat-day");
    assert_eq!(day["week_number"], 1);
    assert_eq!(day["items"][0]["weight"], 170.0);
    assert_eq!(day["items"][0]["sets"].as_array().unwrap().len(), 5);
}

#[test]
fn test_one_rm_mirrors_into_training_max() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    run(data_dir, &["import", DEMO_PROGRAM]);

    run(
        data_dir,
        &["max", "record", "squat", "200", "--type", "1rm", "--date", "2024-06-01"],
    )
    .stdout(predicate::str::contains("squat one_rm = 200"))
    .stdout(predicate::str::contains("squat training_max = 200"));

    // An existing training max on the same date is left alone
    run(
        data_dir,
        &["max", "record", "bench", "90", "--date", "2024-06-01"],
    );
    run(
        data_dir,
        &["max", "record", "bench", "110", "--type", "one_rm", "--date", "2024-06-01"],
    )
    .stdout(predicate::str::contains("bench one_rm = 110"))
    .stdout(predicate::str::contains("training_max").not());

    run(data_dir, &["max", "list", "--lift", "squat"])
        .stdout(predicate::str::contains("2024-06-01"))
        .stdout(predicate::str::contains("one_rm"));
}

#[test]
fn test_max_rejects_unknown_lift() {
    let temp_dir = setup_test_dir();

    cli()
        .args(["max", "record", "curl", "40"])
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("lift 'curl' not found"));
}

#[test]
fn test_session_completion_applies_stage_progression() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]).stdout(predicate::str::contains("Session started"));
    log_sets(data_dir, "squat", "170", "3", 5);
    log_sets(data_dir, "row", "60", "10", 3);

    run(data_dir, &["complete"])
        .stdout(predicate::str::contains("Sets logged: 8"))
        .stdout(predicate::str::contains("Squat / Main lift stages: 200 -> 205"));

    // The enrollment moved on to the bench day with the new squat max
    run(data_dir, &["today"]).stdout(predicate::str::contains("Bench Day"));
    run(data_dir, &["max", "list"]).stdout(predicate::str::contains("205"));

    run(data_dir, &["history"])
        .stdout(predicate::str::contains("Squat"))
        .stdout(predicate::str::contains("200 -> 205"));
}

#[test]
fn test_failed_stage_moves_to_next_stage() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]);
    log_sets(data_dir, "squat", "170", "3", 4);
    run(data_dir, &["log", "squat", "170", "1", "--target", "3"]);

    // Failure keeps the weight; the next stage takes over
    run(data_dir, &["complete"]).stdout(predicate::str::contains("Squat / Main lift stages: 200 -> 200"));
}

#[test]
fn test_second_start_is_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]);
    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in progress"));
}

#[test]
fn test_abandon_keeps_position() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]);
    log_sets(data_dir, "squat", "170", "3", 2);
    run(data_dir, &["abandon"]).stdout(predicate::str::contains("Session abandoned"));

    // No progression, no advance; a new session can start on the same day
    run(data_dir, &["today"]).stdout(predicate::str::contains("Squat Day"));
    run(data_dir, &["history"]).stdout(predicate::str::contains("No progressions applied yet."));
    run(data_dir, &["start"]);
}

#[test]
fn test_log_without_session_fails() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    cli()
        .args(["log", "squat", "170", "3"])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("active session"));
}

#[test]
fn test_reapply_is_idempotent() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]);
    log_sets(data_dir, "squat", "170", "3", 5);
    let output = cli()
        .args(["complete", "--json"])
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let session_id = summary["session"]["id"].as_str().unwrap().to_string();

    run(data_dir, &["reapply", &session_id]).stdout(predicate::str::contains("skipped (already applied)"));

    // The max moved exactly once
    run(data_dir, &["max", "list", "--lift", "squat"]).stdout(predicate::str::contains("205"));
    let ledger = cli()
        .args(["history", "--json"])
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&ledger.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[test]
fn test_full_cycle_bumps_deadlift() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    // Three weeks of three days; only the final day completes the cycle
    for _week in 0..3 {
        for lift in ["squat", "bench", "deadlift"] {
            run(data_dir, &["start"]);
            run(data_dir, &["log", lift, "100", "1"]);
            run(data_dir, &["complete"]);
        }
    }

    run(data_dir, &["history", "--lift", "deadlift"])
        .stdout(predicate::str::contains("Deadlift cycle bump"))
        .stdout(predicate::str::contains("240 -> 245"));

    let output = cli()
        .args(["today", "--json"])
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .unwrap();
    let day: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(day["cycle_iteration"], 2);
    assert_eq!(day["week_number"], 1);
}

#[test]
fn test_users_are_isolated() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    cli()
        .args(["today", "--user", "someone-else"])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not enrolled"));
}

#[test]
fn test_dashboard() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["dashboard"])
        .stdout(predicate::str::contains("Three Day Waves"))
        .stdout(predicate::str::contains("Next: Squat Day"))
        .stdout(predicate::str::contains("0 completed"));
}

#[test]
fn test_export_writes_csv() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    enrolled(data_dir);

    run(data_dir, &["start"]);
    log_sets(data_dir, "squat", "170", "3", 5);
    run(data_dir, &["complete"]);

    let out_dir = data_dir.join("export");
    run(data_dir, &["export", out_dir.to_str().unwrap()])
        .stdout(predicate::str::contains("Exported 5 sets"))
        .stdout(predicate::str::contains("Exported 1 progression rows"));

    let sets = fs::read_to_string(out_dir.join("logged_sets.csv")).unwrap();
    assert_eq!(sets.lines().count(), 6);
    assert!(sets.lines().next().unwrap().starts_with("session_id,"));

    let ledger = fs::read_to_string(out_dir.join("progression_log.csv")).unwrap();
    assert_eq!(ledger.lines().count(), 2);
}
