//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("eventscope")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Headless-browser extraction service",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("eventscope")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("eventscope"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("eventscope")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_scrape_subcommand_exists() {
    Command::cargo_bin("eventscope")
        .unwrap()
        .args(["scrape", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("NDJSON"));
}

#[test]
fn test_check_subcommand_exists() {
    Command::cargo_bin("eventscope")
        .unwrap()
        .args(["check", "--help"])
        .assert()
        .success();
}
