//! CLI-level integration tests (spec.md §8's end-to-end scenarios, driven
//! through the actual binary via `assert_cmd`, following the teacher's split
//! between core unit tests and CLI integration tests).

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::tempdir;

fn mcs(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("mcs").unwrap();
    cmd.env("MCS_HOME", home.join(".mcs"));
    cmd
}

#[test]
fn list_reports_no_codespaces_on_a_fresh_home() {
    let dir = tempdir().unwrap();
    mcs(dir.path()).arg("list").assert().success().stdout(predicate::str::contains("no codespaces"));
}

#[test]
fn config_show_creates_defaults_on_first_run() {
    let dir = tempdir().unwrap();
    mcs(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ipMode\": \"localhost\""));
}

#[test]
fn config_set_ip_mode_round_trips() {
    let dir = tempdir().unwrap();
    mcs(dir.path()).args(["config", "set-ip-mode", "public"]).assert().success();
    mcs(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ipMode\": \"public\""));
}

#[test]
fn config_set_ip_mode_rejects_unknown_mode() {
    let dir = tempdir().unwrap();
    mcs(dir.path())
        .args(["config", "set-ip-mode", "nonsense"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation"));
}

#[test]
fn start_on_unknown_codespace_reports_not_found() {
    let dir = tempdir().unwrap();
    mcs(dir.path())
        .args(["start", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NotFound"))
        .stderr(predicate::str::contains("mcs list"));
}

#[test]
fn remove_on_unknown_codespace_reports_not_found() {
    let dir = tempdir().unwrap();
    mcs(dir.path()).args(["remove", "ghost"]).assert().failure().stderr(predicate::str::contains("NotFound"));
}

#[test]
fn exec_requires_a_command() {
    let dir = tempdir().unwrap();
    mcs(dir.path()).args(["exec", "demo"]).assert().failure();
}

#[test]
#[ignore = "requires network access and a local container runtime"]
fn fresh_create_with_no_start_produces_the_documented_env_file() {
    let dir = tempdir().unwrap();
    mcs(dir.path())
        .args([
            "create",
            "https://github.com/octocat/Hello-World.git",
            "--name",
            "hello",
            "--no-start",
        ])
        .assert()
        .success();

    let env_path = dir.path().join("codespaces/hello/.env");
    let env = std::fs::read_to_string(env_path).unwrap();
    assert!(env.contains("CODESPACE_NAME=hello"));
    assert!(env.contains("REPO_URL=https://github.com/octocat/Hello-World.git"));
}

#[test]
#[ignore = "requires network access and a local container runtime"]
fn create_rejects_name_collision_without_force() {
    let dir = tempdir().unwrap();
    mcs(dir.path())
        .args(["create", "https://github.com/octocat/Hello-World.git", "--name", "hello", "--no-start"])
        .assert()
        .success();

    mcs(dir.path())
        .args(["create", "https://github.com/octocat/Hello-World.git", "--name", "hello", "--no-start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflict"));
}
