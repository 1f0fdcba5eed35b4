//! CLI smoke tests: verify basic binary behavior against an in-memory store.

use std::process::Command;

fn cli_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bond"));
    cmd.env_remove("BOND_DB_PATH")
        .env_remove("BOND_CONFIG")
        .arg("--config")
        .arg("/tmp/nonexistent_bond_config_12345.toml");
    cmd
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("update"));
    assert!(stdout.contains("serve"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bond"), "Expected binary name in --version output");
}

#[test]
fn test_seeded_update_prints_result() {
    let output = cli_bin()
        .args(["--db", ":memory:", "--seed", "7", "update", "u1", "c1", "positive"])
        .output()
        .expect("failed to run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let points = result["affectionPoints"].as_i64().unwrap();
    assert!((3..=5).contains(&points));
    assert_eq!(result["messageCount"], 1);
    assert_eq!(result["phoneJustUnlocked"], false);
}

#[test]
fn test_invalid_sentiment_fails() {
    let output = cli_bin()
        .args(["--db", ":memory:", "update", "u1", "c1", "ecstatic"])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sentiment"), "stderr: {stderr}");
}

#[test]
fn test_stats_for_unknown_pair() {
    let output = cli_bin()
        .args(["--db", ":memory:", "stats", "nobody", "nothing"])
        .output()
        .expect("failed to run");
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(stats["exists"], false);
    assert_eq!(stats["levelName"], "STRANGER");
}

#[test]
fn test_admin_negative_impact() {
    let output = cli_bin()
        .args(["--db", ":memory:", "admin", "u1", "c1", "applyImpact", "--impact", "-2"])
        .output()
        .expect("failed to run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(outcome["affectionPoints"], -6);
    assert_eq!(outcome["action"], "applyImpact");
}
