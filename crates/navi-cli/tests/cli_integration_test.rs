//! CLI Integration Tests
//!
//! Runs the built `navi` binary end to end.
//!
//! Test Scenarios:
//! 1. `parse` on saved output, from a file and from stdin
//! 2. Argument and configuration errors
//! 3. `exec`, `query` and `status` against a fake naviseccli script

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

// ============================================================================
// Test Helpers
// ============================================================================

fn navi_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_navi"))
}

fn navi(args: &[&str]) -> Output {
    Command::new(navi_bin())
        .args(args)
        .env_remove("NAVI_USER")
        .env_remove("NAVI_PASSWORD")
        .env_remove("NAVI_SCOPE")
        .env_remove("NAVI_SECFILE")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run navi")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const POOL_OUTPUT: &str = "Pool Name:  Pool_SAS\nPool ID:  0\nLUNs:  12, 13\n\nPool Name:  Pool_NL\nPool ID:  1\nLUNs:  40\n";

// ============================================================================
// Offline Parsing
// ============================================================================

#[test]
fn test_parse_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(POOL_OUTPUT.as_bytes()).unwrap();

    let output = navi(&["parse", "--type", "Pool", file.path().to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");

    let records: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Pool_SAS");
    assert_eq!(records[0]["luns"], serde_json::json!([12, 13]));
    assert_eq!(records[1]["pool_id"], 1);
}

#[test]
fn test_parse_stdin() {
    let mut child = Command::new(navi_bin())
        .args(["parse", "--type", "Pool", "-"])
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(POOL_OUTPUT.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"Pool_NL\""));
}

#[test]
fn test_parse_custom_parsers() {
    let mut parsers = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        parsers,
        "version: 1\nparsers:\n  Port:\n    properties:\n      - label: 'Port ID:'\n        key: id\n        index: true\n        converter: int\n      - label: 'Link Status:'\n        key: link\n"
    )
    .unwrap();
    let mut input = tempfile::NamedTempFile::new().unwrap();
    write!(input, "Port ID: 0\nLink Status: Up\nPort ID: 1\nLink Status: Down\n").unwrap();

    let output = navi(&[
        "parse",
        "--type",
        "Port",
        "--parsers",
        parsers.path().to_str().unwrap(),
        input.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout(&output).trim(),
        r#"[{"id":0,"link":"Up"},{"id":1,"link":"Down"}]"#
    );
}

// ============================================================================
// Error Handling
// ============================================================================

#[test]
fn test_parse_unknown_type_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(POOL_OUTPUT.as_bytes()).unwrap();

    let output = navi(&["parse", "--type", "Snapshot", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Snapshot"));
}

#[test]
fn test_exec_without_addresses_fails() {
    let output = navi(&["exec", "--", "getagent"]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_subcommand_fails() {
    let output = navi(&["--spa", "10.0.0.1"]);
    assert!(!output.status.success());
}

// ============================================================================
// Against a fake naviseccli
// ============================================================================

#[cfg(unix)]
mod fake_array {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// SPA at 10.0.0.1 is down, SPB answers `getagent` and `storagepool`.
    const FAKE_CLI: &str = r#"#!/bin/sh
if [ "$2" = "10.0.0.1" ]; then
    echo "Error: Cannot access SP A. Storage processor not available" >&2
    exit 0
fi
case "$*" in
    *storagepool*)
        printf 'Pool Name:  Pool_SAS\nPool ID:  0\nLUNs:  12, 13\n'
        ;;
    *getagent*)
        printf 'Agent Rev:  7.33.9 (1.84)\nName:  K10\nSerial No:  APM00123456789\n'
        ;;
    *)
        echo "host=$2"
        ;;
esac
"#;

    fn fake_cli(dir: &TempDir) -> String {
        let path = dir.path().join("naviseccli");
        fs::write(&path, FAKE_CLI).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn navi_against(dir: &TempDir, args: &[&str]) -> Output {
        let binary = fake_cli(dir);
        let mut full = vec![
            "--spa",
            "10.0.0.1",
            "--spb",
            "10.0.0.2",
            "--binary",
            binary.as_str(),
        ];
        full.extend_from_slice(args);
        navi(&full)
    }

    #[test]
    fn test_exec_fails_over() {
        let dir = TempDir::new().unwrap();
        let output = navi_against(&dir, &["exec", "--", "getlun", "-name"]);
        assert!(output.status.success(), "{output:?}");
        assert_eq!(stdout(&output).trim(), "host=10.0.0.2");
    }

    #[test]
    fn test_query_prints_records() {
        let dir = TempDir::new().unwrap();
        let output = navi_against(&dir, &["query", "--type", "Pool", "--", "storagepool", "-list"]);
        assert!(output.status.success(), "{output:?}");

        let records: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Pool_SAS");
        assert_eq!(records[0]["luns"], serde_json::json!([12, 13]));
        // fields missing from the output are reported as null
        assert!(records[0]["raid_type"].is_null());
    }

    #[test]
    fn test_status_reports_both_nodes() {
        let dir = TempDir::new().unwrap();
        let output = navi_against(&dir, &["status"]);
        assert!(output.status.success(), "{output:?}");

        let nodes: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        let nodes = nodes.as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["address"], "10.0.0.1");
        assert_eq!(nodes[0]["available"], "Unavailable");
        assert_eq!(nodes[1]["address"], "10.0.0.2");
        assert_eq!(nodes[1]["available"], "Available");
    }
}
