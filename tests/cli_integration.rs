//! Runs the `marks` binary against a temporary database file.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn marks(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marks"))
        .args(args)
        .env("DATABASE_URL", db)
        .env("AI_ENABLED", "false")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run marks binary")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn add_then_list_round_trips_through_the_database_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = dir.path().join("nested").join("marks.db");

    let added = json(&marks(
        &db,
        &["add", "example.com/rust", "--title", "Rust", "--tags", "rust, lang"],
    ));
    assert_eq!(added["url"], "https://example.com/rust");
    assert_eq!(added["tag_names"], serde_json::json!(["lang", "rust"]));

    let listed = json(&marks(&db, &["list", "--query", "rust"]));
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[test]
fn workflow_moves_new_bookmarks_into_folder() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = dir.path().join("marks.db");

    let folder = json(&marks(&db, &["folder", "add", "GitHub"]));
    let folder_id = folder["id"].to_string();
    json(&marks(
        &db,
        &["workflow", "add", "github", "--url", "github.com", "--folder", &folder_id],
    ));

    json(&marks(&db, &["add", "https://github.com/serde-rs/serde"]));
    json(&marks(&db, &["add", "https://example.com"]));
    let report = json(&marks(&db, &["workflow", "apply"]));

    assert_eq!(report["bookmarks"], 2);
    assert_eq!(report["matches"], 1);

    let contents = json(&marks(&db, &["folder", "show", &folder_id]));
    assert_eq!(contents["name"], "GitHub");
    assert_eq!(contents["total"], 1);
    assert_eq!(contents["bookmarks"][0]["url"], "https://github.com/serde-rs/serde");

    let in_folder = json(&marks(&db, &["list", "--folder", &folder_id]));
    assert_eq!(in_folder.as_array().map(Vec::len), Some(1));
}

#[test]
fn folder_rename_delete_and_tag_filter() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = dir.path().join("marks.db");
    json(&marks(&db, &["add", "https://a.example", "--tags", "rust"]));
    json(&marks(&db, &["add", "https://b.example", "--tags", "go"]));

    let tagged = json(&marks(&db, &["list", "--tag", "rust"]));
    assert_eq!(tagged.as_array().map(Vec::len), Some(1));
    assert_eq!(tagged[0]["url"], "https://a.example/");

    let folder = json(&marks(&db, &["folder", "add", "Inbox"]));
    let folder_id = folder["id"].to_string();
    let renamed = json(&marks(&db, &["folder", "rename", &folder_id, "Later"]));
    assert_eq!(renamed["name"], "Later");

    json(&marks(&db, &["folder", "delete", &folder_id]));
    let missing = marks(&db, &["folder", "show", &folder_id]);
    assert_eq!(missing.status.code(), Some(1));

    let stats = json(&marks(&db, &["stats"]));
    assert_eq!(stats["total"], 2);
}

#[test]
fn optimize_preview_is_default() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = dir.path().join("marks.db");
    json(&marks(&db, &["add", "https://a.example", "--tags", "react"]));
    json(&marks(&db, &["add", "https://b.example", "--tags", "reactjs"]));

    let preview = json(&marks(&db, &["optimize"]));
    assert_eq!(preview["preview"], true);
    assert_eq!(preview["summary"]["total_merges"], 1);

    let stats = json(&marks(&db, &["stats"]));
    assert_eq!(stats["total"], 2);
}

#[test]
fn user_errors_exit_with_one() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = dir.path().join("marks.db");

    let invalid = marks(&db, &["add", "javascript:alert(1)"]);
    assert_eq!(invalid.status.code(), Some(1));

    let missing = marks(&db, &["delete", "999"]);
    assert_eq!(missing.status.code(), Some(1));
}
