//! End-to-end checks of the `nodewiz` binary.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn nodewiz() -> Command {
    let mut cmd = cargo_bin_cmd!("nodewiz");
    cmd.env_remove("NODEWIZ_STATE_DIR").arg("--color").arg("never");
    cmd
}

#[test]
fn help_lists_the_command_groups() {
    nodewiz()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("wiz"))
        .stdout(predicate::str::contains("cluster"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_names_the_binary() {
    nodewiz()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nodewiz"));
}

#[test]
fn init_writes_the_template_and_refuses_to_clobber_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    nodewiz()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[gates.health]"));

    nodewiz()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    nodewiz()
        .args(["config", "init", "--force", "--config"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn freshly_initialized_config_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    nodewiz()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    nodewiz()
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn invalid_config_exits_nonzero_and_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[gates.health]\ntimeout_secs = 0\ninterval_secs = 0\n").unwrap();

    nodewiz()
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("gates.health"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    nodewiz()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure();
}

#[test]
fn json_errors_are_machine_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[gates.health\n").unwrap();

    nodewiz()
        .args(["--json", "config", "validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"type\":\"error\""));
}

#[test]
fn empty_state_lists_no_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let state = dir.path().join("state");
    fs::write(
        &path,
        format!("[state]\ndir = {:?}\n", state.display().to_string()),
    )
    .unwrap();

    nodewiz()
        .args(["cluster", "list", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No clusters"));
}

#[test]
fn describe_of_unknown_cluster_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let state = dir.path().join("state");
    fs::write(
        &path,
        format!("[state]\ndir = {:?}\n", state.display().to_string()),
    )
    .unwrap();

    nodewiz()
        .args(["cluster", "describe", "ghost", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn cluster_help_lists_the_stage_commands() {
    nodewiz()
        .args(["cluster", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("whitelist"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn validate_needs_a_target() {
    nodewiz()
        .args(["cluster", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("primary").and(predicate::str::contains("subnet")));
}
