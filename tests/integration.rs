//! End-to-end tests driving the `ckb` binary against a temporary
//! database, covering init, offline HTSUS ingestion, and the structured
//! lookup commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const SAMPLE_SCHEDULE: &str = "\
HTS Number,Indent,Description,General Rate of Duty,Special Rate of Duty
0406,0,\"Cheese and curd:\",,
0406.10,1,\"Fresh (unripened or uncured) cheese, including whey cheese\",,
0406.10.04,2,Chongos,10%,\"Free (A+, AU, BH)\"
0406.20,1,Grated or powdered cheese,,
0406.20.10,2,Roquefort,8%,
";

fn ckb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ckb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    fs::write(root.join("hts_sample.csv"), SAMPLE_SCHEDULE).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ckb.sqlite"

[chunking]
chunk_size = 512
overlap = 50

[server]
bind = "127.0.0.1:8300"
"#,
        root.display()
    );

    let config_path = config_dir.join("ckb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ckb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ckb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ckb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ckb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ckb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ckb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_htsus_ingest_from_file() {
    let (tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let csv = tmp.path().join("hts_sample.csv");
    let (stdout, stderr, success) = run_ckb(
        &config_path,
        &["ingest", "htsus", "--file", csv.to_str().unwrap()],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status:    completed"));
    assert!(stdout.contains("processed: 5"));
}

#[test]
fn test_htsus_ingest_idempotent() {
    let (tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let csv = tmp.path().join("hts_sample.csv");
    let csv = csv.to_str().unwrap();
    run_ckb(&config_path, &["ingest", "htsus", "--file", csv]);
    let (stdout, _, success) = run_ckb(&config_path, &["ingest", "htsus", "--file", csv]);
    assert!(success);
    assert!(stdout.contains("processed: 5"));

    // Still five codes, not ten
    let (stdout, _, _) = run_ckb(&config_path, &["status"]);
    assert!(stdout.contains("HTS codes:   5"), "status was: {}", stdout);
}

#[test]
fn test_hts_get_shows_inferred_parent() {
    let (tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let csv = tmp.path().join("hts_sample.csv");
    run_ckb(&config_path, &["ingest", "htsus", "--file", csv.to_str().unwrap()]);

    let (stdout, stderr, success) = run_ckb(&config_path, &["hts", "get", "0406.10.04"]);
    assert!(success, "hts get failed: {}", stderr);
    assert!(stdout.contains("Chongos"));
    assert!(stdout.contains("parent:       0406.10"));
    assert!(stdout.contains("general rate: 10%"));
}

#[test]
fn test_hts_get_unknown_code_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (_, stderr, success) = run_ckb(&config_path, &["hts", "get", "9999.99.99"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_hts_search_by_description() {
    let (tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let csv = tmp.path().join("hts_sample.csv");
    run_ckb(&config_path, &["ingest", "htsus", "--file", csv.to_str().unwrap()]);

    let (stdout, _, success) = run_ckb(&config_path, &["hts", "search", "cheese"]);
    assert!(success);
    assert!(stdout.contains("0406.10"));
    assert!(stdout.contains("Grated or powdered cheese"));
}

#[test]
fn test_hts_search_json_output() {
    let (tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let csv = tmp.path().join("hts_sample.csv");
    run_ckb(&config_path, &["ingest", "htsus", "--file", csv.to_str().unwrap()]);

    let (stdout, _, success) = run_ckb(&config_path, &["hts", "search", "Roquefort", "--json"]);
    assert!(success);

    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["hts_number"], "0406.20.10");
    assert_eq!(arr[0]["parent_hts_number"], "0406.20");
}

#[test]
fn test_docs_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (stdout, _, success) = run_ckb(&config_path, &["docs"]);
    assert!(success);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_get_unknown_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (_, stderr, success) = run_ckb(&config_path, &["get", "2025-99999"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_search_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (_, stderr, success) = run_ckb(&config_path, &["search", "cheese imports"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr was: {}", stderr);
}

#[test]
fn test_invalid_date_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (_, stderr, success) = run_ckb(&config_path, &["docs", "--from", "03/14/2025", "--to", "2025-06-30"]);
    assert!(!success);
    assert!(stderr.contains("Invalid date"));
}
