//! Runs the `converge` binary end to end.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn converge() -> Command {
    let mut cmd = Command::cargo_bin("converge").unwrap();
    cmd.env("CONVERGE_HEALTH_TTL", "0s")
        .env("CONVERGE_POLL_INTERVAL", "20ms")
        .env("CONVERGE_LOG", "warn")
        .env_remove("CONVERGE_CONFIG");
    cmd
}

fn summary(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("summary is JSON")
}

fn state_of<'a>(summary: &'a Value, id: &str) -> &'a str {
    summary["resources"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == id)
        .and_then(|r| r["state"].as_str())
        .unwrap()
}

#[test]
fn demo_provisions_everything() {
    let output = converge().arg("demo").assert().success();
    let summary = summary(&output.get_output().stdout);

    assert_eq!(summary["cancelled"], false);
    assert_eq!(summary["resources"].as_array().unwrap().len(), 5);
    for id in ["broker", "topic", "subscription", "ollama", "model"] {
        assert_eq!(state_of(&summary, id), "running", "{id}");
    }
}

#[test]
fn existing_objects_are_accepted() {
    let output = converge()
        .args(["demo", "--conflict", "topic", "--conflict", "model"])
        .assert()
        .success();
    let summary = summary(&output.get_output().stdout);
    assert_eq!(state_of(&summary, "topic"), "running");
    assert_eq!(state_of(&summary, "model"), "running");
}

#[test]
fn failure_exits_non_zero() {
    let output = converge()
        .args(["demo", "--fail", "broker"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("dependency failed: broker"));
    let summary = summary(&output.get_output().stdout);
    assert_eq!(state_of(&summary, "broker"), "failed_to_start");
    assert_eq!(state_of(&summary, "ollama"), "running");
}

#[test]
fn reads_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        dependency_timeout = "30s"

        [kind_retry.topic]
        max_attempts = 1
        "#
    )
    .unwrap();

    converge()
        .args(["demo", "--config"])
        .arg(file.path())
        .assert()
        .success();
}

#[test]
fn invalid_config_is_reported() {
    converge()
        .env("CONVERGE_POLL_INTERVAL", "5s")
        .arg("demo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval"));
}

#[test]
fn missing_config_file_is_reported() {
    converge()
        .args(["demo", "--config", "/nonexistent/converge.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}
