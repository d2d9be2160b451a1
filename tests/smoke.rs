//! Smoke tests -- verify the binary runs and its subcommands parse.

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    Command::cargo_bin("ixload-rest").unwrap()
}

#[test]
fn test_cli_help() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("IxLoad gateway"));
}

#[test]
fn test_cli_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ixload-rest"));
}

#[test]
fn test_run_subcommand_exists() {
    bin()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--profile").and(predicate::str::contains("--ixload-version")));
}

#[test]
fn test_run_requires_profile() {
    bin()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--profile"));
}

#[test]
fn test_sessions_subcommand_exists() {
    bin().args(["sessions", "--help"]).assert().success();
}

#[test]
fn test_abort_subcommand_exists() {
    bin()
        .args(["abort", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--session"));
}

#[test]
fn test_stat_names_subcommand_exists() {
    bin().args(["stat-names", "--help"]).assert().success();
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["--config"])
        .arg(dir.path().join("absent.toml"))
        .arg("sessions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_unreadable_env_config_warning_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .current_dir(dir.path())
        .env("IXLOAD_REST_CONFIG", dir.path().join("absent.toml"))
        .env_remove("RUST_LOG")
        .args(["--port", "1", "stat-names", "--session", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IXLOAD_REST_CONFIG set but file could not be loaded"));
}
