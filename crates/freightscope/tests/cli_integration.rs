//! CLI integration tests for the freightscope command-line interface.
//!
//! Investigations run against the `mock` backend and a temporary dataset,
//! so no network access or API key is needed.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// A command for the freightscope binary, isolated from the user's config.
fn freightscope(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("freightscope").unwrap();
    cmd.current_dir(dir)
        .env("FREIGHTSCOPE_CONFIG_DIR", dir)
        .env_remove("FREIGHTSCOPE_CUSTOMER")
        .env_remove("ANTHROPIC_API_KEY");
    cmd
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("shipments.json"),
        r#"[
            {"customer_id": "acme", "ship_date": "2024-03-01", "carrier": "UPS", "cost": 120.5},
            {"customer_id": "acme", "ship_date": "2024-03-02", "carrier": "FedEx", "cost": 80.0}
        ]"#,
    )
    .unwrap();
    dir
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = workspace();
    freightscope(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = workspace();
    freightscope(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("freightscope"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = workspace();
    freightscope(dir.path()).arg("chat").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tools_lists_catalog() {
    let dir = workspace();
    freightscope(dir.path())
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tool catalog 2024.3 (12 tools)"))
        .stdout(predicate::str::contains("get_hierarchical_data"));
}

#[test]
fn test_tools_json() {
    let dir = workspace();
    let output = freightscope(dir.path())
        .args(["--json", "tools"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["version"], "2024.3");
    assert_eq!(body["tools"].as_array().unwrap().len(), 12);
}

#[test]
fn test_tools_single_shows_schema() {
    let dir = workspace();
    freightscope(dir.path())
        .args(["tools", "preview_aggregation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Input schema:"))
        .stdout(predicate::str::contains("group_by"));
}

#[test]
fn test_tools_unknown_name_fails() {
    let dir = workspace();
    freightscope(dir.path())
        .args(["tools", "get_weather"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown tool"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Ask Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_requires_customer() {
    let dir = workspace();
    freightscope(dir.path())
        .args(["ask", "How many shipments?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--customer"));
}

#[test]
fn test_ask_rejects_unknown_mode() {
    let dir = workspace();
    freightscope(dir.path())
        .args(["ask", "How many shipments?", "--customer", "acme", "--mode", "slow"])
        .assert()
        .failure();
}

#[test]
fn test_ask_json_with_mock_backend() {
    let dir = workspace();
    let output = freightscope(dir.path())
        .args([
            "--json",
            "ask",
            "Why did costs rise?",
            "--customer",
            "acme",
            "--backend",
            "mock",
            "--dataset",
            "shipments.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["success"], true);
    assert!(body["answer"].as_str().unwrap().contains("mock backend"));
    assert_eq!(body["metadata"]["mode"], "deep");
    assert_eq!(body["metadata"]["termination"], "completed");
    assert_eq!(body["follow_up_questions"].as_array().unwrap().len(), 3);
}

#[test]
fn test_ask_forced_mode_text_output() {
    let dir = workspace();
    freightscope(dir.path())
        .args([
            "ask",
            "How many shipments?",
            "--customer",
            "acme",
            "--mode",
            "visual",
            "--backend",
            "mock",
            "--dataset",
            "shipments.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("mock backend"))
        .stdout(predicate::str::contains("Follow-up questions:"))
        .stdout(predicate::str::contains("visual mode"));
}

#[test]
fn test_ask_missing_dataset_fails() {
    let dir = workspace();
    freightscope(dir.path())
        .args([
            "ask",
            "How many shipments?",
            "--customer",
            "acme",
            "--backend",
            "mock",
            "--dataset",
            "missing.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn test_ask_anthropic_without_key_fails() {
    let dir = workspace();
    freightscope(dir.path())
        .args([
            "ask",
            "How many shipments?",
            "--customer",
            "acme",
            "--dataset",
            "shipments.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn test_ask_uses_config_file_backend() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("config.toml"),
        "[llm]\nbackend = \"mock\"\n\n[store]\ndataset_path = \"shipments.json\"\n",
    )
    .unwrap();

    freightscope(dir.path())
        .args(["ask", "How many shipments?", "--customer", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mock backend"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_reports_sources() {
    let dir = workspace();
    std::fs::write(dir.path().join("config.toml"), "[llm]\nbackend = \"mock\"\n").unwrap();

    freightscope(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ loaded"))
        .stdout(predicate::str::contains("Backend: mock"))
        .stdout(predicate::str::contains("quick_turns = 3"));
}

#[test]
fn test_config_show_project_file_overrides_user() {
    let dir = workspace();
    std::fs::write(dir.path().join("config.toml"), "[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();
    std::fs::write(
        dir.path().join("freightscope.toml"),
        "[server]\nbind = \"0.0.0.0:9100\"\n",
    )
    .unwrap();

    freightscope(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Server:  0.0.0.0:9100"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = workspace();
    freightscope(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
