//! `kb` binary tests with embedding and completion providers disabled.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("raft.md"),
        "# Raft\n\nRaft elects a leader using randomized election timeouts.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kb.sqlite"

[storage]
root = "{root}/data/blobs"

[chunking]
max_chars = 500
overlap_chars = 50

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_kb"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run kb binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kb.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_kb(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_kb(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_note_without_embeddings() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["ingest", "note", "Espresso takes about 25 seconds.", "--title", "Coffee"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingested \"Coffee\""));
    // Embedding is disabled, so nothing reaches the index.
    assert!(stdout.contains("chunks: 1 (0 indexed)"));
}

#[test]
fn test_ingest_file_stores_blob() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let file = tmp.path().join("files/raft.md");
    let (stdout, stderr, success) =
        run_kb(&config_path, &["ingest", "file", file.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingested \"raft.md\""));

    let blobs: Vec<_> = fs::read_dir(tmp.path().join("data/blobs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(blobs.len(), 1);
    assert!(blobs[0].ends_with(".md"));
}

#[test]
fn test_search_and_ask_with_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, _, success) = run_kb(&config_path, &["search", "raft"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_kb(&config_path, &["ask", "What is Raft?"]);
    assert!(success);
    assert!(stdout.contains("couldn't find any relevant information"));
}

#[test]
fn test_invalid_source_kind_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) =
        run_kb(&config_path, &["search", "raft", "--source-kind", "video"]);
    assert!(!success);
    assert!(stderr.contains("Unknown source kind"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kb(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
