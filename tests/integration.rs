use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn memidx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_memidx"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create test notes
    let notes = root.join("notes");
    fs::create_dir_all(notes.join("daily")).unwrap();
    fs::create_dir_all(notes.join("topics")).unwrap();
    fs::create_dir_all(notes.join(".git")).unwrap();
    fs::write(
        notes.join("memory.md"),
        "# Memory\n\nSam prefers oat milk in coffee.\n\nThe boat is moored at the harbour.",
    )
    .unwrap();
    fs::write(
        notes.join("daily").join("2026-10-18.md"),
        "Walked to the harbour with Sam. Discussed the sailing trip and weather.",
    )
    .unwrap();
    fs::write(
        notes.join("topics").join("rust.md"),
        "Rust notes: cargo workspaces, async traits and sqlx with sqlite.",
    )
    .unwrap();
    fs::write(notes.join("scratch.txt"), "not markdown, never indexed").unwrap();
    fs::write(notes.join(".git").join("ignored.md"), "git internals").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/memidx.sqlite"

[chunking]
size_words = 50
overlap_words = 10

[embedding]
provider = "hash"
dims = 64

[vector]
backend = "linear"

[corpus]
root = "{root}/notes"
include_globs = ["**/*.md"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("memidx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_memidx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = memidx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run memidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn indexed_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    run_memidx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_memidx(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

fn search_json(config_path: &Path, args: &[&str]) -> Vec<serde_json::Value> {
    let mut full = vec!["search"];
    full.extend_from_slice(args);
    full.push("--json");
    let (stdout, stderr, success) = run_memidx(config_path, &full);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    value.as_array().unwrap().clone()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_memidx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("memidx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_memidx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_memidx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_corpus_then_unchanged() {
    let (_tmp, config_path) = setup_test_env();
    run_memidx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_memidx(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files seen: 3"));
    assert!(stdout.contains("files indexed: 3"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_memidx(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("files unchanged: 3"));
    assert!(stdout.contains("chunks written: 0"));

    let (stdout, _, success) = run_memidx(&config_path, &["index", "--force"]);
    assert!(success);
    assert!(stdout.contains("files indexed: 3"));
}

#[test]
fn test_index_detects_changes() {
    let (tmp, config_path) = indexed_env();

    fs::write(
        tmp.path().join("notes").join("topics").join("rust.md"),
        "Rust notes, revised: tokio runtimes and tracing subscribers.",
    )
    .unwrap();

    let (stdout, _, success) = run_memidx(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("files indexed: 1"));
    assert!(stdout.contains("files unchanged: 2"));
}

#[test]
fn test_search_lexical_json() {
    let (_tmp, config_path) = indexed_env();

    let results = search_json(&config_path, &["oat milk", "--mode", "lexical"]);
    assert!(!results.is_empty());
    assert_eq!(results[0]["rank"], 1);
    assert!(results[0]["source_path"]
        .as_str()
        .unwrap()
        .ends_with("memory.md"));
    assert_eq!(results[0]["document_class"], "memory");
}

#[test]
fn test_search_hybrid_and_class_filter() {
    let (_tmp, config_path) = indexed_env();

    // Hybrid includes vector-only candidates, so every chunk can appear.
    let all = search_json(&config_path, &["harbour"]);
    assert_eq!(all.len(), 3);
    let ranks: Vec<i64> = all.iter().map(|r| r["rank"].as_i64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3]);

    let daily = search_json(&config_path, &["harbour", "--class", "daily"]);
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0]["document_class"], "daily");

    let (stdout, _, success) = run_memidx(&config_path, &["search", "harbour", "--top-k", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_memidx(
        &config_path,
        &["search", "xyzzy", "--mode", "lexical"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_rejects_unknown_mode() {
    let (_tmp, config_path) = indexed_env();

    let (_, _, success) = run_memidx(&config_path, &["search", "harbour", "--mode", "fuzzy"]);
    assert!(!success);
}

#[test]
fn test_recent_and_get() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, stderr, success) = run_memidx(&config_path, &["recent", "--days", "1", "--json"]);
    assert!(success, "recent failed: stdout={}, stderr={}", stdout, stderr);
    let recent: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let recent = recent.as_array().unwrap();
    assert_eq!(recent.len(), 3);

    let id = recent[0]["chunk_id"].as_str().unwrap();
    let (stdout, _, success) = run_memidx(&config_path, &["get", id, "--json"]);
    assert!(success);
    let chunk: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(chunk["chunk_id"], id);
    assert_eq!(chunk["embedding_dims"], 64);

    let (_, _, success) = run_memidx(&config_path, &["get", "no-such-chunk"]);
    assert!(!success);
}

#[test]
fn test_files_show_and_remove() {
    let (tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_memidx(&config_path, &["files"]);
    assert!(success);
    assert!(stdout.contains("memory.md"));
    assert!(stdout.contains("2026-10-18.md"));
    assert!(!stdout.contains("scratch.txt"));
    assert!(!stdout.contains("ignored.md"));

    let memory_path = tmp.path().join("notes").join("memory.md");
    let memory = memory_path.to_str().unwrap();

    let (stdout, _, success) = run_memidx(&config_path, &["show", memory]);
    assert!(success);
    assert!(stdout.contains("--- File ---"));
    assert!(stdout.contains("--- Chunk 0"));

    let (stdout, _, success) = run_memidx(&config_path, &["remove", memory]);
    assert!(success);
    assert!(stdout.contains("removed"));

    let (stdout, _, _) = run_memidx(&config_path, &["files"]);
    assert!(!stdout.contains("memory.md"));
}

#[test]
fn test_index_prune_removes_deleted_files() {
    let (tmp, config_path) = indexed_env();

    fs::remove_file(tmp.path().join("notes").join("topics").join("rust.md")).unwrap();

    let (stdout, stderr, success) = run_memidx(&config_path, &["index", "--prune"]);
    assert!(success, "prune failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files removed: 1"));

    let (stdout, _, _) = run_memidx(&config_path, &["files"]);
    assert!(!stdout.contains("rust.md"));
}

#[test]
fn test_index_explicit_path_and_bad_utf8() {
    let (tmp, config_path) = setup_test_env();
    run_memidx(&config_path, &["init"]);

    let bad = tmp.path().join("notes").join("topics").join("binary.md");
    fs::write(&bad, [0xff, 0xfe, 0xfd]).unwrap();

    let (stdout, stderr, success) =
        run_memidx(&config_path, &["index", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("failures: 1"));
    assert!(stderr.contains("not valid UTF-8"));

    let good = tmp.path().join("notes").join("topics");
    let (stdout, _, success) = run_memidx(&config_path, &["index", good.to_str().unwrap()]);
    // binary.md is in the directory too, so one failure remains.
    assert!(!success);
    assert!(stdout.contains("files indexed: 1"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, stderr, success) = run_memidx(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Files:       3"));
    assert!(stdout.contains("linear scan"));
    assert!(stdout.contains("feature-hash-64 (64 dims)"));
    assert!(stdout.contains("daily"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_memidx(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
