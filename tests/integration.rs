use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use notes_harness::models::{FingerprintRecord, SyncState};
use notes_harness::store::{FingerprintStore, SqliteFingerprintStore};
use notes_harness::{db, migrate};

fn nh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("nh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    write_export(
        &root,
        r#"[
            {"id": "note-1", "title": "Groceries", "body": "milk, eggs, bread"},
            {"id": "note-2", "title": "Trip", "body": "pack socks", "modified_at": "2024-03-01T10:00:00Z"},
            {"id": "note-3", "title": "Ideas", "body": "write a sync engine"}
        ]"#,
    );

    let config_content = format!(
        r#"[db]
path = "{root}/data/nh.sqlite"

[source]
kind = "export"
export_path = "{root}/notes.json"

[remote]
api_key_env = "NH_TEST_API_KEY_UNSET"

[sync]
guard_min_tracked = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("nh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_export(root: &Path, json: &str) {
    fs::write(root.join("notes.json"), json).unwrap();
}

fn run_nh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = nh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run nh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Record `ids` as synced so the next pass sees them as tracked.
async fn seed_synced(db_path: &Path, ids: &[&str]) {
    let pool = db::connect_path(db_path).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = SqliteFingerprintStore::new(pool.clone());
    for id in ids {
        store
            .put(&FingerprintRecord {
                local_id: id.to_string(),
                content_hash: "0".repeat(64),
                remote_file_id: Some(format!("file-{}", id)),
                sync_state: SyncState::Synced,
                title: id.to_string(),
                last_error: None,
                updated_at: 1_700_000_000,
            })
            .await
            .unwrap();
    }
    pool.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_nh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/nh.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_nh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_nh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_status_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_nh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_nh(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("Tracked:       0"));
    assert!(stdout.contains("(not configured)"));
}

#[test]
fn test_status_json() {
    let (_tmp, config_path) = setup_test_env();

    run_nh(&config_path, &["init"]);
    let (stdout, _, success) = run_nh(&config_path, &["status", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["source"], "export");
    assert_eq!(parsed["summary"]["tracked"], 0);
}

#[test]
fn test_sync_dry_run_plans_additions() {
    let (_tmp, config_path) = setup_test_env();

    run_nh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_nh(&config_path, &["sync", "--dry-run"]);
    assert!(success, "dry-run failed: {}", stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("to add: 3"));
    assert!(stdout.contains("to remove: 0"));
    assert!(stdout.contains("+ note-2  Trip"));
}

#[test]
fn test_sync_dry_run_respects_limit() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) =
        run_nh(&config_path, &["sync", "--dry-run", "--limit", "1", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["additions"], 1);
    assert_eq!(parsed["deletions"], 0);
}

#[tokio::test]
async fn test_sync_dry_run_detects_changes_and_deletions() {
    let (tmp, config_path) = setup_test_env();
    seed_synced(&tmp.path().join("data/nh.sqlite"), &["note-1", "gone"]).await;

    let (stdout, stderr, success) = run_nh(&config_path, &["sync", "--dry-run"]);
    assert!(success, "dry-run failed: {}", stderr);
    // note-1 is tracked with a different hash; note-2/3 are new; "gone" was deleted.
    assert!(stdout.contains("to add: 2"), "{}", stdout);
    assert!(stdout.contains("to update: 1"), "{}", stdout);
    assert!(stdout.contains("to remove: 1"), "{}", stdout);
    assert!(stdout.contains("- gone"));
}

#[tokio::test]
async fn test_empty_snapshot_trips_deletion_guard() {
    let (tmp, config_path) = setup_test_env();
    seed_synced(&tmp.path().join("data/nh.sqlite"), &["a", "b", "c"]).await;
    write_export(tmp.path(), "[]");

    let (_, stderr, success) = run_nh(&config_path, &["sync", "--dry-run"]);
    assert!(!success, "an empty snapshot must not plan mass deletion");
    assert!(
        stderr.contains("refusing to delete 3 of 3"),
        "unexpected error: {}",
        stderr
    );

    let (stdout, stderr, success) =
        run_nh(&config_path, &["sync", "--dry-run", "--allow-mass-delete"]);
    assert!(success, "override failed: {}", stderr);
    assert!(stdout.contains("to remove: 3"));
}

#[test]
fn test_sync_without_vector_store_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_nh(&config_path, &["init"]);
    let (_, stderr, success) = run_nh(&config_path, &["sync"]);
    assert!(!success);
    assert!(
        stderr.contains("No vector store configured"),
        "unexpected error: {}",
        stderr
    );
}

#[test]
fn test_sync_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    let mut content = fs::read_to_string(&config_path).unwrap();
    content = content.replace(
        "api_key_env = \"NH_TEST_API_KEY_UNSET\"",
        "api_key_env = \"NH_TEST_API_KEY_UNSET\"\nvector_store_id = \"vs_test\"",
    );
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_nh(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("NH_TEST_API_KEY_UNSET"), "{}", stderr);
}

#[test]
fn test_missing_export_is_provider_error() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("notes.json")).unwrap();

    let (_, stderr, success) = run_nh(&config_path, &["sync", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("note extraction failed"), "{}", stderr);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_nh(&config_path, &["search", ""]);
    assert!(success, "Empty query should not fail");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_before_init_reports_missing_vector_store() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_nh(&config_path, &["search", "hello"]);
    assert!(!success);
    assert!(
        stderr.contains("No vector store configured"),
        "unexpected error: {}",
        stderr
    );
    assert!(!stderr.contains("no such table"));
    assert!(tmp.path().join("data/nh.sqlite").exists());
}

#[test]
fn test_resolve_disabled() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_nh(&config_path, &["resolve", "x-coredata://S/ICNote/p1"]);
    assert!(success);
    assert!(stdout.contains("unavailable"));
}

#[test]
fn test_unknown_progress_mode() {
    let (_tmp, config_path) = setup_test_env();

    let output = Command::new(nh_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("loud")
        .arg("status")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown progress mode"));
}

#[test]
fn test_missing_config() {
    let (_, stderr, success) = run_nh(Path::new("/nonexistent/nh.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
