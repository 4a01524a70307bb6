//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Data directory with one CSV file plus a config pointing a file store at `root`
fn fixture(root: &Path) -> std::path::PathBuf {
    let data = root.join("data");
    fs::create_dir(&data).unwrap();
    fs::write(
        data.join("courses.csv"),
        "code_module,code_presentation,module_presentation_length\n\
         AAA,2013J,268\n\
         BBB,2014B,234\n",
    )
    .unwrap();

    let config = root.join("oulad.toml");
    fs::write(
        &config,
        format!(
            "batch_size = 1\n\
             data_dir = {:?}\n\
             \n\
             [store]\n\
             backend = \"file\"\n\
             base_dir = {:?}\n",
            data.display().to_string(),
            root.join("store").display().to_string(),
        ),
    )
    .unwrap();
    config
}

fn oulad() -> Command {
    let mut cmd = Command::cargo_bin("oulad").unwrap();
    cmd.env_remove("OULAD_DATABASE")
        .env_remove("OULAD_BATCH_SIZE")
        .env_remove("OULAD_DATA_DIR")
        .env_remove("OULAD_STORE_BACKEND")
        .env_remove("OULAD_STORE_DIR");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_help_flag() {
    oulad()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_report_help() {
    oulad()
        .args(["report", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("student-counts"));
}

#[test]
fn test_invalid_command() {
    oulad()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_count_requires_collections() {
    oulad().arg("count").assert().failure();
}

#[test]
fn test_files_lists_csv_files() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());

    let files = json_stdout(oulad().arg("--config").arg(&config).arg("files"));
    assert_eq!(files[0]["file_name"], "courses.csv");
}

#[test]
fn test_load_then_count_and_dump() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());

    let report = json_stdout(oulad().arg("--config").arg(&config).arg("load"));
    let courses = report["files"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["collection"] == "courses")
        .unwrap()
        .clone();
    assert_eq!(courses["inserted"], 2);

    let counts = json_stdout(oulad().arg("-c").arg(&config).args(["count", "courses"]));
    assert_eq!(counts, serde_json::json!({"courses": 2}));

    let docs = json_stdout(oulad().arg("-c").arg(&config).args(["dump", "courses"]));
    assert_eq!(docs.as_array().unwrap().len(), 2);
}

#[test]
fn test_dump_unknown_collection_fails() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());

    oulad()
        .arg("-c")
        .arg(&config)
        .args(["dump", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to fetch 'nowhere'"));
}

#[test]
fn test_invalid_config_is_reported() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("bad.toml");
    fs::write(&config, "batch_size = 0\n").unwrap();

    oulad()
        .arg("-c")
        .arg(&config)
        .args(["files"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be positive"));
}
