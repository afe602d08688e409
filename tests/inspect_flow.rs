//! Integration tests for the export, run, and inspect flow.
//!
//! These tests export a demo model to a temp dir, run it with event tracing
//! enabled, then exercise the opsight-inspect subcommands against the
//! produced artifacts.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use opsight::Inspector;
use tempfile::TempDir;

/// Run opsight with the given arguments, returning the full Output.
fn run_opsight(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opsight"))
        .args(args)
        .output()
        .expect("Failed to run opsight")
}

/// Run opsight-inspect with the given arguments, returning the full Output.
fn run_inspect(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opsight-inspect"))
        .args(args)
        .output()
        .expect("Failed to run opsight-inspect")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Export the demo model and trace a few runs, returning the artifact paths.
fn produce_artifacts(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let program = dir.join("prog.json");
    let record = dir.join("record.json");
    let trace = dir.join("trace.json");

    let output = run_opsight(&[
        "export",
        "-m",
        "mlp",
        "-o",
        program.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "export failed: {:?}", output);

    let output = run_opsight(&[
        "run",
        "--model-path",
        program.to_str().unwrap(),
        "--trace",
        trace.to_str().unwrap(),
        "--iterations",
        "3",
    ]);
    assert!(output.status.success(), "run failed: {:?}", output);

    (program, record, trace)
}

#[test]
fn test_tabular_with_record_shows_operator_identity() {
    let dir = TempDir::new().unwrap();
    let (_, record, trace) = produce_artifacts(dir.path());

    let output = run_inspect(&[
        "tabular",
        "--trace",
        trace.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("op_type"));
    assert!(stdout.contains("module"));
    assert!(stdout.contains("net.fc1.matmul"));
    assert!(stdout.contains("matmul"));
}

#[test]
fn test_tabular_without_record_is_uncorrelated() {
    let dir = TempDir::new().unwrap();
    let (_, _, trace) = produce_artifacts(dir.path());

    let output = run_inspect(&["tabular", "--trace", trace.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(!stdout.contains("op_type"));
    // Event names still render without the record.
    assert!(stdout.contains("net.fc1.matmul"));
}

#[test]
fn test_tabular_filter_and_csv() {
    let dir = TempDir::new().unwrap();
    let (_, record, trace) = produce_artifacts(dir.path());

    let output = run_inspect(&[
        "tabular",
        "--trace",
        trace.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
        "--filter",
        "fc1",
        "--format",
        "csv",
    ]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    // Header plus the two fc1 events.
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.lines().skip(1).all(|l| l.contains("fc1")));
}

#[test]
fn test_tabular_json_has_one_object_per_event() {
    let dir = TempDir::new().unwrap();
    let (_, record, trace) = produce_artifacts(dir.path());

    let output = run_inspect(&[
        "tabular",
        "--trace",
        trace.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
        "--format",
        "json",
    ]);
    assert!(output.status.success());
    let rows: Vec<serde_json::Value> = serde_json::from_str(&stdout_of(&output)).unwrap();
    // The demo mlp lowers to six instructions.
    assert_eq!(rows.len(), 6);
    assert!(rows[0].get("op_type").is_some());
}

#[test]
fn test_tabular_missing_trace_fails() {
    let output = run_inspect(&["tabular", "--trace", "/nonexistent/trace.json"]);
    assert!(!output.status.success());
}

#[test]
fn test_tabular_bad_filter_fails() {
    let dir = TempDir::new().unwrap();
    let (_, _, trace) = produce_artifacts(dir.path());
    let output = run_inspect(&[
        "tabular",
        "--trace",
        trace.to_str().unwrap(),
        "--filter",
        "(unclosed",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_convert_writes_perfetto_trace() {
    let dir = TempDir::new().unwrap();
    let (_, _, trace) = produce_artifacts(dir.path());
    let pb = dir.path().join("trace.pb");

    let output = run_inspect(&[
        "convert",
        "--trace",
        trace.to_str().unwrap(),
        "--output",
        pb.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let metadata = std::fs::metadata(&pb).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn test_validate_produced_artifacts() {
    let dir = TempDir::new().unwrap();
    let (_, record, trace) = produce_artifacts(dir.path());

    let output = run_inspect(&[
        "validate",
        "--trace",
        trace.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "validate failed: {:?}", output);
    assert!(stdout_of(&output).contains("OK"));
}

#[test]
fn test_empty_trace_renders_placeholder() {
    let dir = TempDir::new().unwrap();
    let trace = dir.path().join("trace.json");
    opsight::RunTrace {
        session_id: 1,
        program_name: "mlp".to_string(),
        runs: Vec::new(),
    }
    .write_to_file(&trace)
    .unwrap();

    let output = run_inspect(&["tabular", "--trace", trace.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("(no events)"));
}

#[test]
fn test_inspector_totals_match_trace() {
    let dir = TempDir::new().unwrap();
    let (_, record, trace_path) = produce_artifacts(dir.path());

    let inspector = Inspector::new(&trace_path, Some(&record)).unwrap();
    assert!(inspector.is_correlated());
    assert_eq!(inspector.num_runs(), 3);

    let trace = opsight::RunTrace::from_file(&trace_path).unwrap();
    let trace_total: u64 = trace
        .runs
        .iter()
        .flat_map(|r| r.events.iter())
        .map(|e| e.duration_ns())
        .sum();
    let event_total: u64 = inspector.events().iter().map(|e| e.total_ns()).sum();
    assert_eq!(trace_total, event_total);

    // Every instruction of the demo model correlates to an operator.
    assert!(inspector.events().iter().all(|e| e.op_type.is_some()));
    assert_eq!(inspector.find_total_for_module("net"), event_total);
}
