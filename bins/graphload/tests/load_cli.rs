//! End-to-end tests for the `graphload` CLI.
//!
//! Each test writes a JSON-lines element file into a temp dir, runs the
//! binary against the in-process simulated store and checks stdout, the exit
//! status and the marker files.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Run the graphload binary, returning (success, stdout, stderr)
fn run_graphload(args: &[&str]) -> (bool, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_graphload"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute graphload command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (output.status.success(), stdout, stderr)
}

fn write_elements(dir: &Path, vertices: usize, extra: &[&str]) -> String {
    let mut lines: Vec<String> = (0..vertices)
        .map(|i| {
            format!(
                r#"{{"kind":"vertex","id":"v{}","label":"city","partition_key":"r{}","properties":{{"name":"city {}"}}}}"#,
                i,
                i % 5,
                i
            )
        })
        .collect();
    lines.extend(extra.iter().map(|s| s.to_string()));

    let path = dir.join("elements.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path.to_str().unwrap().to_string()
}

/// Value of `metric` in the TSV summary
fn metric<'a>(stdout: &'a str, metric: &str) -> Option<&'a str> {
    stdout.lines().find_map(|line| {
        let (name, value) = line.split_once('\t')?;
        (name == metric).then_some(value)
    })
}

#[test]
fn test_load_reports_summary_and_writes_done_marker() {
    let dir = TempDir::new().unwrap();
    let input = write_elements(dir.path(), 120, &["this is not json"]);
    let done = dir.path().join("out").join("load.done");

    let (ok, stdout, stderr) = run_graphload(&[
        "load",
        "--input",
        &input,
        "--batch-size",
        "50",
        "--seed",
        "5",
        "--done-marker",
        done.to_str().unwrap(),
        "--format",
        "tsv",
    ]);

    assert!(ok, "load failed: {}", stderr);
    assert!(stdout.contains("Start time: "));
    assert!(stdout.contains("Finish time: "));
    assert_eq!(metric(&stdout, "batches"), Some("3"));
    assert_eq!(metric(&stdout, "succeeded"), Some("120"));
    assert_eq!(metric(&stdout, "failed"), Some("0"));
    assert_eq!(metric(&stdout, "rows_rejected"), Some("1"));
    assert_eq!(metric(&stdout, "final_level"), Some("7"));

    let marker: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&done).unwrap()).unwrap();
    assert_eq!(marker["succeeded"], 120);
    assert_eq!(marker["rows_read"], 120);
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_elements(dir.path(), 30, &[]);

    let (ok, stdout, _) = run_graphload(&[
        "load", "--input", &input, "--dry-run", "--batch-size", "10", "-f", "tsv",
    ]);

    assert!(ok);
    assert_eq!(metric(&stdout, "dry_run"), Some("true"));
    assert_eq!(metric(&stdout, "batches"), Some("3"));
    assert_eq!(metric(&stdout, "rows_read"), Some("30"));
    assert_eq!(metric(&stdout, "succeeded"), Some("0"));
    assert_eq!(metric(&stdout, "final_level"), Some("-"));
}

#[test]
fn test_failures_past_tolerance_exit_non_zero_with_error_marker() {
    let dir = TempDir::new().unwrap();
    let dangling = r#"{"kind":"edge","id":"e1","label":"road","partition_key":"r0","source_id":"v0","target_id":"nowhere"}"#;
    let input = write_elements(dir.path(), 5, &[dangling]);
    let error_marker = dir.path().join("load.error");
    let done_marker = dir.path().join("load.done");

    let (ok, stdout, stderr) = run_graphload(&[
        "load",
        "--input",
        &input,
        "--strict-edges",
        "--error-marker",
        error_marker.to_str().unwrap(),
        "--done-marker",
        done_marker.to_str().unwrap(),
        "-f",
        "tsv",
    ]);

    assert!(!ok);
    assert!(stderr.contains("exceed tolerance 0"), "stderr: {}", stderr);
    // The halted run still reports what it wrote
    assert_eq!(metric(&stdout, "succeeded"), Some("5"));
    assert_eq!(metric(&stdout, "failed"), Some("1"));
    assert_eq!(metric(&stdout, "fatal_batches"), Some("1"));
    assert!(stdout.contains("failed: e1 (validation failed"), "stdout: {}", stdout);
    assert!(stdout.contains("Finish time: "));

    assert!(!done_marker.exists());
    let body = std::fs::read_to_string(&error_marker).unwrap();
    assert!(body.contains("accumulated failures 1 exceed tolerance 0"));
    let (_, summary) = body.split_once("summary:\n").unwrap();
    let summary: serde_json::Value = serde_json::from_str(summary).unwrap();
    assert_eq!(summary["succeeded"], 5);
    assert_eq!(summary["failed"], 1);
}

#[test]
fn test_failures_within_tolerance_succeed() {
    let dir = TempDir::new().unwrap();
    let dangling = r#"{"kind":"edge","id":"e1","label":"road","partition_key":"r0","source_id":"v0","target_id":"nowhere"}"#;
    let input = write_elements(dir.path(), 5, &[dangling]);

    let (ok, stdout, stderr) = run_graphload(&[
        "load",
        "--input",
        &input,
        "--strict-edges",
        "--failure-tolerance",
        "1",
        "-f",
        "tsv",
    ]);

    assert!(ok, "load failed: {}", stderr);
    assert_eq!(metric(&stdout, "failed"), Some("1"));
    assert_eq!(metric(&stdout, "fatal_batches"), Some("1"));
    assert!(stdout.contains("failed: e1"));
}

#[test]
fn test_missing_input_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.jsonl");
    let error_marker = dir.path().join("load.error");

    let (ok, _, stderr) = run_graphload(&[
        "load",
        "--input",
        missing.to_str().unwrap(),
        "--error-marker",
        error_marker.to_str().unwrap(),
    ]);

    assert!(!ok);
    assert!(stderr.contains("missing.jsonl"));
    assert!(error_marker.exists());
}

#[test]
fn test_invalid_level_flags_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    let input = write_elements(dir.path(), 3, &[]);

    let (ok, _, stderr) = run_graphload(&[
        "load",
        "--input",
        &input,
        "--initial-level",
        "8",
        "--max-level",
        "4",
    ]);

    assert!(!ok);
    assert!(stderr.contains("initial_concurrency_level"));
}

#[test]
fn test_throttle_demo_prints_one_row_per_level() {
    let (ok, stdout, stderr) = run_graphload(&[
        "throttle",
        "--base-count",
        "100",
        "--max-level",
        "5",
        "--format",
        "tsv",
    ]);

    assert!(ok, "throttle failed: {}", stderr);
    let rows: Vec<Vec<&str>> = stdout.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], vec!["1", "100", "1", "0"]);
    assert_eq!(rows[3], vec!["4", "25", "4", "0"]);
    assert_eq!(rows[4], vec!["5", "20", "5", "0"]);
}
