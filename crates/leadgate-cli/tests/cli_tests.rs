//! Integration tests for the `leadgate` CLI binary.
//!
//! These tests run the CLI as a subprocess against an address where no
//! server listens, verifying argument parsing and exit codes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

/// Helper: locate the `leadgate` binary built by `cargo test`.
fn leadgate_bin() -> String {
    let path = env!("CARGO_BIN_EXE_leadgate");
    assert!(
        Path::new(path).exists(),
        "leadgate binary not found at {path}"
    );
    path.to_owned()
}

/// Helper: run leadgate with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(leadgate_bin())
        .args(args)
        .env("LEADGATE_ADDR", "http://127.0.0.1:19999") // Non-existent server
        .env_remove("LEADGATE_ADMIN_TOKEN")
        .output()
        .expect("failed to execute leadgate");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "leadgate --version should exit 0");
    assert!(
        stdout.contains("leadgate"),
        "version output should contain 'leadgate': {stdout}"
    );
}

#[test]
fn test_help_lists_commands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "leadgate --help should exit 0");
    assert!(stdout.contains("Leadgate CLI"), "help should mention Leadgate CLI");
    for sub in ["health", "stats", "export", "reset"] {
        assert!(stdout.contains(sub), "help should list '{sub}' command");
    }
    assert!(stdout.contains("LEADGATE_ADMIN_TOKEN"));
}

#[test]
fn test_stats_help_mentions_config() {
    let (code, stdout, _) = run(&["stats", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("--config"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let (code, _, stderr) = run(&["frobnicate"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("frobnicate"));
}

// ── Failure paths ────────────────────────────────────────────────────

#[test]
fn test_stats_without_token_fails() {
    let (code, _, stderr) = run(&["stats"]);
    assert_ne!(code, 0, "stats without a token should fail");
    assert!(
        stderr.contains("no admin token"),
        "should explain the missing token: {stderr}"
    );
}

#[test]
fn test_health_unreachable_server_fails() {
    let (code, _, stderr) = run(&["health"]);
    assert_ne!(code, 0, "health against a dead address should fail");
    assert!(stderr.contains("request failed"), "stderr: {stderr}");
}

#[test]
fn test_export_unreachable_server_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("logs.csv");
    let (code, _, _) = run(&[
        "--token",
        "t",
        "export",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert_ne!(code, 0);
    assert!(!out.exists(), "no file should be written on failure");
}
