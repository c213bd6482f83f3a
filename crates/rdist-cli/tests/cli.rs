//! End-to-end tests for rdist CLI commands.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rdist() -> Command {
    Command::cargo_bin("rdist").expect("rdist binary not built")
}

// =============================================================================
// partition
// =============================================================================

#[test]
fn test_partition_entries() {
    rdist()
        .args(["partition", "--entries", "10", "--npartitions", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 ranges"))
        .stdout(predicate::str::contains("[0, 3)  3 entries"))
        .stdout(predicate::str::contains("[8, 10)  2 entries"));
}

#[test]
fn test_partition_reduces_count() {
    rdist()
        .args(["partition", "--entries", "3", "--npartitions", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 ranges"));
}

#[test]
fn test_partition_files() {
    rdist()
        .args([
            "partition",
            "--file",
            "run2.root=10",
            "--file",
            "run1.root=10",
            "--npartitions",
            "3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("run1.root, run2.root"));
}

#[test]
fn test_partition_zero_partitions() {
    rdist()
        .args(["partition", "--entries", "10", "--npartitions", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("npartitions"));
}

#[test]
fn test_partition_files_overflowing_total() {
    rdist()
        .args([
            "partition",
            "--file",
            "a=18446744073709551615",
            "--file",
            "b=1",
            "-n",
            "2",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overflows"));
}

// =============================================================================
// check
// =============================================================================

#[test]
fn test_check_distributable() {
    rdist()
        .args(["check", "Histo1D", "--npartitions", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("action"));
}

#[test]
fn test_check_not_distributable() {
    rdist()
        .args(["check", "Take", "--npartitions", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported in multi-worker mode"))
        .stderr(predicate::str::contains("hint:"));

    rdist()
        .args(["check", "Take", "--npartitions", "1"])
        .assert()
        .success();
}

#[test]
fn test_check_both_modes() {
    rdist()
        .args(["check", "Snapshot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not supported"));
}

#[test]
fn test_check_unknown_operation() {
    rdist()
        .args(["check", "bogus_op"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown operation: bogus_op"));
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_local() {
    rdist()
        .args(["run", "--entries", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("count  1000"))
        .stdout(predicate::str::contains("local backend agrees"));
}

#[test]
fn test_run_threads() {
    for executor in ["rayon", "tokio"] {
        rdist()
            .args([
                "run",
                "--backend",
                "threads",
                "--executor",
                executor,
                "--npartitions",
                "7",
                "--entries",
                "5000",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("7 partitions"))
            .stdout(predicate::str::contains("local backend agrees"));
    }
}

#[test]
fn test_run_with_config_and_files() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("backend.json");
    fs::write(
        &config,
        r#"{"executor": "rayon", "npartitions": 3, "parameters": {"max_threads": 2}}"#,
    )
    .unwrap();
    let aux = temp.path().join("aux");
    fs::create_dir_all(&aux).unwrap();
    fs::write(aux.join("lumi.json"), "{}").unwrap();
    fs::write(aux.join("pileup.txt"), "42").unwrap();

    rdist()
        .args(["run", "--backend", "threads", "--entries", "300", "--config"])
        .arg(&config)
        .arg("--send")
        .arg(&aux)
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered 2 files"))
        .stdout(predicate::str::contains("3 partitions"));
}

#[test]
fn test_run_threads_without_executor() {
    rdist()
        .args(["run", "--backend", "threads", "--entries", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("executor"));
}

#[test]
fn test_run_reserved_backend() {
    rdist()
        .args(["run", "--backend", "dask"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not implemented"));
}

#[test]
fn test_run_unknown_backend() {
    rdist()
        .args(["run", "--backend", "mpi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Incorrect backend environment"));
}

#[test]
fn test_run_missing_file() {
    rdist()
        .args(["run", "--entries", "10", "--send", "/nonexistent/rdist/aux"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot distribute"));
}

#[test]
fn test_run_zero_entries() {
    rdist()
        .args(["run", "--entries", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("count  0"));
}
