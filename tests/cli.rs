use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::NamedTempFile;

fn throttlegate() -> Command {
    let mut cmd = Command::cargo_bin("throttlegate").unwrap();
    cmd.env_remove("THROTTLEGATE_RATE_LIMIT")
        .env_remove("THROTTLEGATE_RATE_WINDOW_SECS")
        .env_remove("THROTTLEGATE_LOG_LEVEL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_version() {
    throttlegate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("throttlegate 0.1.0"));
}

#[test]
fn test_cli_help() {
    throttlegate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rate-limited HTTP server and load tooling"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("burst"));
}

#[test]
fn test_cli_check_config_defaults() {
    let missing = NamedTempFile::new().unwrap().path().with_extension("missing");

    throttlegate()
        .arg("check-config")
        .arg("--config")
        .arg(&missing)
        .assert()
        .success()
        .stdout(predicate::str::contains("limit = 100"))
        .stdout(predicate::str::contains("window_secs = 60"))
        .stdout(predicate::str::contains("algorithm = \"fixed_window\""));
}

#[test]
fn test_cli_check_config_file() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        "[rate_limit]\nlimit = 5\nwindow_secs = 2\nalgorithm = \"token_bucket\"\n",
    )
    .unwrap();

    throttlegate()
        .arg("check-config")
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("limit = 5"))
        .stdout(predicate::str::contains("algorithm = \"token_bucket\""));
}

#[test]
fn test_cli_reports_config_source() {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), "[logging]\nlevel = \"info\"\n").unwrap();

    throttlegate()
        .arg("check-config")
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded configuration from"));

    let missing = file.path().with_extension("missing");
    throttlegate()
        .args(["check-config", "--verbose", "--config"])
        .arg(&missing)
        .assert()
        .success()
        .stderr(predicate::str::contains("using defaults"));
}

#[test]
fn test_cli_warns_on_invalid_env_override() {
    let missing = NamedTempFile::new().unwrap().path().with_extension("missing");

    throttlegate()
        .arg("check-config")
        .arg("--config")
        .arg(&missing)
        .env("THROTTLEGATE_RATE_LIMIT", "0")
        .assert()
        .success()
        .stdout(predicate::str::contains("limit = 100"))
        .stderr(predicate::str::contains("Ignoring invalid environment override"));
}

#[test]
fn test_cli_check_config_rejects_invalid_policy() {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), "[rate_limit]\nlimit = 0\n").unwrap();

    throttlegate()
        .arg("check-config")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid limit"));
}

#[test]
fn test_cli_serve_rejects_unknown_algorithm() {
    throttlegate()
        .args(["serve", "--algorithm", "leaky_bucket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown algorithm"));
}
