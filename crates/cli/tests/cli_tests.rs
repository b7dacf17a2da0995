//! CLI integration tests

use std::process::Command;

fn eoctl(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "eo-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = eoctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("energy optimiser"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("suggestions"), "Should show suggestions command");
    assert!(stdout.contains("--controller-url"));
    assert!(stdout.contains("--suggestion-dir"));
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = eoctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("eoctl"), "Should show binary name");
}

#[test]
fn test_suggestions_list_json_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sug_3.json"),
        r#"{"cycle":3,"timestamp":"2024-05-01T12:00:00Z","action":"CONSOLIDATE","action_id":1,"target":"worker-1"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("sug_4.json"),
        r#"{"cycle":4,"timestamp":"2024-05-01T12:02:00Z","action":"DO_NOTHING","action_id":0,"target":null}"#,
    )
    .unwrap();

    let dir_arg = dir.path().to_string_lossy().to_string();
    let output = eoctl(&[
        "--suggestion-dir",
        &dir_arg,
        "--format",
        "json",
        "suggestions",
        "list",
        "--limit",
        "1",
    ]);

    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["cycle"], 4);
    assert_eq!(records[0]["action"], "DO_NOTHING");
}

#[test]
fn test_suggestions_show_missing_cycle_fails() {
    let dir = tempfile::tempdir().unwrap();
    let dir_arg = dir.path().to_string_lossy().to_string();

    let output = eoctl(&["--suggestion-dir", &dir_arg, "suggestions", "show", "99"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no suggestion recorded for cycle 99"));
}

/// Test suggestions subcommand help
#[test]
fn test_suggestions_help() {
    let output = eoctl(&["suggestions", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("list"));
    assert!(stdout.contains("show"));
}
