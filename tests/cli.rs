// ABOUTME: Integration tests for the convoy CLI commands.
// ABOUTME: Drives the binary against a temporary project with file-backed providers.

use assert_cmd::Command;
use convoy::deploy::InstanceLock;
use convoy::types::ServiceName;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PROJECT: &str = r#"
service: shop
image: registry.example.com/shop

environments:
  dev: {}
  staging: {}
  prod: {}

triggers:
  develop: dev

registry:
  tags:
    abc1234: "sha256:abc123"

health:
  poll_interval: 10ms
  healthy_threshold: 2

alerts:
  log: false
"#;

fn convoy_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("convoy"))
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("convoy.yml"), PROJECT).unwrap();
    dir
}

fn in_project(dir: &Path) -> Command {
    let mut cmd = convoy_cmd();
    cmd.current_dir(dir).env_remove("CONVOY_LOG");
    cmd
}

#[test]
fn help_shows_commands() {
    convoy_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("promote"))
        .stdout(predicate::str::contains("approve"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("convoy.yml");

    convoy_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "billing"])
        .assert()
        .success();

    assert!(config_path.exists(), "convoy.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("service: billing"));
    assert!(content.contains("environments:"));

    convoy_cmd()
        .current_dir(temp_dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 environment(s)"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("convoy.yml");

    fs::write(&config_path, "existing: config").unwrap();

    convoy_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn validate_rejects_unknown_trigger_target() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("convoy.yml"),
        "service: shop\nimage: shop\nenvironments:\n  dev: {}\ntriggers:\n  main: staging\n",
    )
    .unwrap();

    in_project(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unconfigured environment 'staging'"));
}

#[test]
fn validate_without_config_fails() {
    let dir = tempfile::tempdir().unwrap();

    in_project(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn deploy_pinned_digest_to_dev() {
    let dir = project();

    in_project(dir.path())
        .args(["deploy", "--env", "dev", "--commit", "abc1234", "--digest", "sha256:def456"])
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"))
        .stdout(predicate::str::contains("sha256:def456"));

    let infra = fs::read_to_string(dir.path().join(".convoy/infra/dev.json")).unwrap();
    assert!(infra.contains("sha256:def456"));
    assert!(dir.path().join(".convoy/history/dev.jsonl").exists());
    assert!(!dir.path().join(".convoy/convoy.lock").exists());
}

#[test]
fn trigger_resolves_tag_from_registry_table() {
    let dir = project();

    in_project(dir.path())
        .args(["--quiet", "trigger", "--commit", "abc1234", "--ref", "refs/heads/develop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev healthy"));
}

#[test]
fn unmapped_trigger_fails() {
    let dir = project();

    in_project(dir.path())
        .args(["trigger", "--commit", "abc1234", "--ref", "feature/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("feature/x"));
}

#[test]
fn unknown_tag_fails_without_history() {
    let dir = project();

    in_project(dir.path())
        .args(["deploy", "--env", "dev", "--commit", "fff0000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    assert!(!dir.path().join(".convoy/history/dev.jsonl").exists());
}

#[test]
fn history_json_lists_records() {
    let dir = project();

    in_project(dir.path())
        .args(["deploy", "--env", "dev", "--commit", "abc1234"])
        .assert()
        .success();

    let output = in_project(dir.path())
        .args(["--json", "history", "--env", "dev"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event"], "record");
    assert_eq!(lines[0]["data"]["state"], "healthy");
    assert_eq!(lines[0]["data"]["environment"], "dev");
    assert_eq!(lines[0]["data"]["artifact"]["digest"], "sha256:abc123");
}

#[test]
fn promote_moves_healthy_artifact() {
    let dir = project();

    in_project(dir.path())
        .args(["deploy", "--env", "dev", "--commit", "abc1234"])
        .assert()
        .success();

    in_project(dir.path())
        .args(["--quiet", "promote", "--from", "dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("staging healthy"));

    in_project(dir.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dev"))
        .stdout(predicate::str::contains("staging"))
        .stdout(predicate::str::contains("never deployed"));
}

#[test]
fn promote_without_history_fails() {
    let dir = project();

    in_project(dir.path())
        .args(["promote", "--from", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no deployments"));
}

#[test]
fn approve_writes_approval_file() {
    let dir = project();

    in_project(dir.path())
        .args(["approve", "--env", "prod", "--as", "alice", "--digest", "sha256:abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"));

    let file = fs::read_to_string(dir.path().join(".convoy/approvals/prod.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&file).unwrap();
    assert_eq!(value["approver"], "alice");
    assert_eq!(value["digest"], "sha256:abc123");
}

#[test]
fn approve_unknown_environment_fails() {
    let dir = project();

    in_project(dir.path())
        .args(["approve", "--env", "qa", "--as", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("qa"));
}

#[test]
fn pre_approved_prod_deploy_succeeds() {
    let dir = project();

    in_project(dir.path())
        .args([
            "--quiet",
            "deploy",
            "--env",
            "prod",
            "--commit",
            "abc1234",
            "--approve-as",
            "alice",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("prod healthy"));
}

#[test]
fn deploy_refuses_while_another_orchestrator_runs() {
    let dir = project();
    let service = ServiceName::new("shop").unwrap();
    let _held = InstanceLock::acquire(&dir.path().join(".convoy"), &service, false).unwrap();

    in_project(dir.path())
        .args(["deploy", "--env", "dev", "--commit", "abc1234"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("another orchestrator holds"));
}
