use std::io::Write;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::NamedTempFile;

fn ingest_bench() -> Command {
    let mut cmd = Command::cargo_bin("ingest-bench").expect("binary built");
    cmd.env("RUST_LOG", "error");
    cmd
}

fn run_json(args: &[&str]) -> Value {
    let output = ingest_bench()
        .args(args)
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("report is valid json")
}

#[test]
fn small_run_reports_fully_drained_counter() {
    let report = run_json(&[
        "--lanes",
        "4",
        "--submitters",
        "2",
        "--batches",
        "10",
        "--edges-per-batch",
        "8",
        "--entities",
        "50",
    ]);
    assert_eq!(report["lanes"], 4);
    assert_eq!(report["submitters"], 2);
    assert_eq!(report["edges_submitted"], 2 * 10 * 8);
    assert_eq!(report["final_outstanding_bytes"], 0);
    assert_eq!(report["metrics"]["edges_applied"], 2 * 10 * 8);
    assert_eq!(report["metrics"]["submissions_accepted"], 2 * 10);
    assert_eq!(
        report["metrics"]["bytes_accepted"],
        report["metrics"]["bytes_released"]
    );
}

#[test]
fn conflict_injection_shows_up_as_retries() {
    let report = run_json(&[
        "--lanes",
        "2",
        "--submitters",
        "1",
        "--batches",
        "5",
        "--edges-per-batch",
        "10",
        "--conflict-every",
        "4",
    ]);
    assert!(report["metrics"]["edges_retried"].as_u64().unwrap() > 0);
    assert_eq!(report["metrics"]["edges_applied"], 50);
    assert_eq!(report["final_outstanding_bytes"], 0);
}

#[test]
fn config_file_sets_executor_options() {
    let mut config = NamedTempFile::new().unwrap();
    let raw = r#"
lane_count = 3
mailbox_capacity = 8
max_pending_bytes = 4096

[ramp]
poll_interval_ms = 1
"#;
    config.write_all(raw.as_bytes()).unwrap();
    let path = config.path().to_str().unwrap().to_owned();
    let report = run_json(&[
        "--config",
        &path,
        "--submitters",
        "1",
        "--batches",
        "20",
    ]);
    assert_eq!(report["lanes"], 3);
    assert_eq!(report["final_outstanding_bytes"], 0);
}

#[test]
fn text_output_lists_counters() {
    let output = ingest_bench()
        .args(["--lanes", "2", "--submitters", "1", "--batches", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("edges submitted"));
    assert!(text.contains("final outstanding bytes"));
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "lane_count = 0").unwrap();
    let output = ingest_bench()
        .args(["--config", config.path().to_str().unwrap()])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("error:"));
}

#[test]
fn zero_attributes_is_rejected() {
    ingest_bench()
        .args(["--attrs", "0"])
        .assert()
        .failure();
}
