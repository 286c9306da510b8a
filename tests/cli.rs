// ABOUTME: Integration tests for the deploy-pipeline CLI.
// ABOUTME: Validates --help output, init, and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;

fn cli_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("deploy-pipeline"))
}

#[test]
fn help_shows_options_and_init() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("--destination"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("deploy-pipeline.yml");

    cli_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "bookmanager"])
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("service: bookmanager"));
    assert!(content.contains("cluster:"));
    assert!(content.contains("image:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("deploy-pipeline.yml"), "existing: config").unwrap();

    cli_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_exits_with_general_error() {
    let temp_dir = tempfile::tempdir().unwrap();

    cli_cmd()
        .current_dir(temp_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn invalid_config_exits_before_touching_the_engine() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("deploy-pipeline.yml"),
        "cluster: production\nservice: bookmanager\nimage: bookmanager:1.4.0\ndesired_count: 0\n",
    )
    .unwrap();

    cli_cmd()
        .current_dir(temp_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("desired_count"));
}

#[test]
fn unknown_destination_is_a_config_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("pipeline.yml");
    fs::write(
        &config_path,
        "cluster: production\nservice: bookmanager\nimage: bookmanager:1.4.0\n",
    )
    .unwrap();

    cli_cmd()
        .arg("--config")
        .arg(&config_path)
        .args(["--destination", "qa"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown destination: qa"));
}

#[test]
fn quiet_and_json_conflict() {
    cli_cmd().args(["--quiet", "--json"]).assert().code(2);
}

#[test]
fn json_config_error_uses_the_failure_shape() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("deploy-pipeline.yml"),
        "cluster: production\nservice: bookmanager\nimage: bookmanager:1.4.0\ndesired_count: 0\n",
    )
    .unwrap();

    cli_cmd()
        .current_dir(temp_dir.path())
        .arg("--json")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(r#""stage":"setup""#))
        .stderr(predicate::str::contains(r#""error_kind":"invalid_config""#));
}

#[test]
fn failing_pre_deploy_hook_reports_setup_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("deploy-pipeline.yml"),
        "cluster: production\nservice: bookmanager\nimage: bookmanager:1.4.0\n",
    )
    .unwrap();
    let hooks_dir = temp_dir.path().join(".deploy-pipeline/hooks");
    fs::create_dir_all(&hooks_dir).unwrap();
    let hook = hooks_dir.join("pre-deploy");
    fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
    fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();

    cli_cmd()
        .current_dir(temp_dir.path())
        .arg("--json")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(r#""stage":"setup""#))
        .stderr(predicate::str::contains(r#""error_kind":"hook_failed""#));
}
