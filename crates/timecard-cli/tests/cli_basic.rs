//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data directory
//! and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "timecard-cli", "--"])
        .args(args)
        .env("TIMECARD_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_config_show() {
    let (stdout, _, code) = run_cli(&["config", "show"]);
    assert_eq!(code, 0, "config show failed");
    assert!(stdout.contains("[identity]"));
    assert!(stdout.contains("[executor]"));
}

#[test]
fn test_session_status_json() {
    let (stdout, _, code) = run_cli(&["session", "status", "--json"]);
    assert_eq!(code, 0, "session status failed");
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("status --json is not valid JSON");
    assert!(parsed.get("is_working").is_some());
    assert!(parsed.get("needs_checkout_correction").is_some());
}

#[test]
fn test_reserve_list_json() {
    let (stdout, _, code) = run_cli(&["reserve", "list", "--json"]);
    assert_eq!(code, 0, "reserve list failed");
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("reserve list --json is not valid JSON");
    assert!(parsed.is_array());
}

#[test]
fn test_exec_run_json() {
    let (stdout, _, code) = run_cli(&["exec", "run", "--json"]);
    assert_eq!(code, 0, "exec run failed");
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("exec run --json is not valid JSON");
    assert!(parsed.get("items").is_some());
}

#[test]
fn test_log_rejects_bad_date() {
    let (_, _, code) = run_cli(&["log", "on", "not-a-date"]);
    assert_ne!(code, 0);
}
