//! CLI integration tests for tuple-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! the commands that need no database, and exit codes for error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;

/// Get a command for the tuple-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("tuple-migrate").unwrap()
}

const MODEL: &str = r#"
tuples:
  - id: 1
    desc: patient
    table: person
    matches:
      - id: 1
        left: { table: person, column: person_id }
        right: { table: t_paciente, column: nid }
        default_value: AI
        is_pk: YES
        references:
          - { id: 1, referenced: { table: t_paciente, column: nid }, referenced_value: ALL }
  - id: 2
    parent: 1
    desc: patient identifier
    table: patient_identifier
    matches:
      - id: 2
        left: { table: patient_identifier, column: patient_id }
        default_value: TOP
        is_pk: YES
        references:
          - { id: 1, referenced: { table: t_paciente, column: nid }, referenced_value: CURR }
"#;

const CONFIG: &str = r#"
source: { host: legacy.local, database: sesp, user: reader, password: secret }
target: { host: openmrs.local, database: openmrs, user: writer, password: secret }
translation:
  matching_model: model.yaml
  process_file: state/process.json
"#;

/// Write a config and matching model into `dir`.
fn workspace(dir: &Path, model: &str) {
    std::fs::write(dir.join("config.yaml"), CONFIG).unwrap();
    std::fs::write(dir.join("model.yaml"), model).unwrap();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--reset"))
        .stdout(predicate::str::contains("--tree-limit"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tuple-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_zero_tree_limit_is_rejected() {
    cmd()
        .args(["run", "--tree-limit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tree-limit"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "status"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: legacy.local").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_model_exits_with_code_1() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), &MODEL.replace("is_pk: YES\n        references:\n          - { id: 1, referenced: { table: t_paciente, column: nid }, referenced_value: CURR }", "references: []"));

    cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Tuple 2 must have exactly one PK match"));
}

// =============================================================================
// Commands Without Database Access
// =============================================================================

#[test]
fn test_validate_prints_tuple_tree() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), MODEL);

    cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Matching model is valid (2 tuples)"))
        .stdout(predicate::str::contains("[1] patient -> person (1 matches)"))
        .stdout(predicate::str::contains(
            "  [2] patient identifier -> patient_identifier (1 matches)",
        ));
}

#[test]
fn test_validate_json_output() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), MODEL);

    cmd()
        .current_dir(dir.path())
        .args(["--output-json", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"))
        .stdout(predicate::str::contains("\"tuples\": 2"));
}

#[test]
fn test_status_of_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), MODEL);

    cmd()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: RESET"))
        .stdout(predicate::str::contains("Last stop point: 0"))
        .stdout(predicate::str::contains("Resumable: no"));
}

#[test]
fn test_status_reads_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    workspace(dir.path(), MODEL);
    std::fs::create_dir_all(dir.path().join("state")).unwrap();
    std::fs::write(
        dir.path().join("state/process.json"),
        r#"{ "last_stop_point": 12, "timestamp": "2014-09-05T10:30:00Z", "status": "PAUSED" }"#,
    )
    .unwrap();

    cmd()
        .current_dir(dir.path())
        .args(["--output-json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"last_stop_point\": 12"))
        .stdout(predicate::str::contains("\"status\": \"PAUSED\""));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_short_config_flag() {
    // -c should work as short for --config
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
