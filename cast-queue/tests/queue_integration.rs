//! Integration tests for cast-queue

use assert_cmd::Command;
use libcastboard::{ContentStore, Database, Post, PostStatus};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("castboard.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[[targets]]
id = "twitter"
name = "Twitter"
kind = "twitter"
max_content_length = 280

[[targets]]
id = "linkedin"
name = "LinkedIn"
kind = "linkedin"
max_content_length = 3000
"#,
        db_path.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

fn cast_queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("cast-queue").unwrap();
    cmd.env("CASTBOARD_CONFIG", config_path)
        .env("CASTBOARD_OWNER", "alice")
        .env_remove("CASTBOARD_DB_PATH");
    cmd
}

fn enable_targets(config_path: &str) {
    for target in ["twitter", "linkedin"] {
        cast_queue(config_path)
            .args(["targets", "enable", target])
            .assert()
            .success();
    }
}

fn create_post(config_path: &str, extra: &[&str]) -> String {
    enable_targets(config_path);
    let output = cast_queue(config_path)
        .args([
            "create",
            "--title",
            "Launch",
            "--content",
            "We are live",
            "--target",
            "twitter",
            "--target",
            "linkedin",
        ])
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn show_json(config_path: &str, post_id: &str) -> serde_json::Value {
    let output = cast_queue(config_path)
        .args(["show", post_id, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_create_and_list() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    cast_queue(&config_path)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&post_id))
        .stdout(predicate::str::contains("scheduled"))
        .stdout(predicate::str::contains("in 1 hour"));

    let output = cast_queue(&config_path)
        .args(["list", "--format", "json"])
        .output()
        .unwrap();
    let posts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(posts[0]["id"], post_id.as_str());
    assert_eq!(posts[0]["status"], "scheduled");
    assert_eq!(posts[0]["targets"][1]["target_id"], "linkedin");
    assert_eq!(posts[0]["targets"][1]["status"], "pending");
}

#[test]
fn test_list_is_scoped_to_owner() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    cast_queue(&config_path)
        .env("CASTBOARD_OWNER", "bob")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&post_id).not());
}

#[test]
fn test_create_draft_without_time() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--draft"]);

    assert_eq!(show_json(&config_path, &post_id)["status"], "draft");
}

#[test]
fn test_create_requires_time() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", "c"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--at is required"));
}

#[test]
fn test_create_rejects_unknown_target_and_past_time() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", "c", "--target", "myspace", "--at", "+1h"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown target 'myspace'"));

    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", "c", "--at", "2001-01-01 00:00"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("must be in the future"));
}

#[test]
fn test_create_enforces_target_rules() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    // Nothing enabled for this owner yet
    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", "c", "--target", "twitter", "--at", "+1h"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("'twitter' is not enabled"));

    enable_targets(&config_path);

    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", "c", "--at", "+1h"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("At least one target"));

    let long = "x".repeat(281);
    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", &long, "--target", "twitter", "--target", "linkedin", "--at", "+1h"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("at most 280 (Twitter)"));

    cast_queue(&config_path)
        .args(["create", "--title", "t", "--content", &long, "--target", "linkedin", "--at", "+1h"])
        .assert()
        .success();
}

#[test]
fn test_submit_draft() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--draft"]);

    cast_queue(&config_path)
        .args(["submit", &post_id, "--at", "+3h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled post"));
    assert_eq!(show_json(&config_path, &post_id)["status"], "scheduled");

    cast_queue(&config_path)
        .args(["submit", &post_id, "--at", "+3h"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid status transition"));
}

#[test]
fn test_cancel_moves_to_draft_once() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    cast_queue(&config_path)
        .args(["cancel", &post_id])
        .assert()
        .success();
    assert_eq!(show_json(&config_path, &post_id)["status"], "draft");

    cast_queue(&config_path)
        .args(["cancel", &post_id])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid status transition"));
}

#[tokio::test]
async fn test_reschedule_failed_post_resets_targets() {
    let (_temp_dir, config_path, db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    // Simulate a cycle that failed one target
    let db = Database::new(&db_path).await.unwrap();
    let mut post: Post = db.get(&post_id).await.unwrap().unwrap();
    post.targets[0].mark_published(Some("twitter_1234567".to_string()));
    post.targets[1].mark_failed("Rejected by target");
    post.status = PostStatus::Failed;
    db.save(&post).await.unwrap();
    db.close().await;

    cast_queue(&config_path)
        .args(["reschedule", &post_id, "+10m"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rescheduled post"));

    let shown = show_json(&config_path, &post_id);
    assert_eq!(shown["status"], "scheduled");
    for target in shown["targets"].as_array().unwrap() {
        assert_eq!(target["status"], "pending");
        assert!(target["external_ref"].is_null());
        assert!(target["error_message"].is_null());
    }
}

#[test]
fn test_reschedule_rejects_bad_time() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    cast_queue(&config_path)
        .args(["reschedule", &post_id, "not a time"])
        .assert()
        .code(3);
}

#[test]
fn test_update_and_delete() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);

    cast_queue(&config_path)
        .args(["update", &post_id, "--content", "Edited", "--target", "twitter"])
        .assert()
        .success();
    let shown = show_json(&config_path, &post_id);
    assert_eq!(shown["content"], "Edited");
    assert_eq!(shown["targets"].as_array().unwrap().len(), 1);

    cast_queue(&config_path)
        .args(["delete", &post_id])
        .assert()
        .success();
    cast_queue(&config_path)
        .args(["show", &post_id])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_target_enablement() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    cast_queue(&config_path)
        .args(["targets", "enable", "twitter"])
        .assert()
        .success();

    cast_queue(&config_path)
        .args(["targets", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("twitter | Twitter | twitter | 280 | enabled"))
        .stdout(predicate::str::contains("linkedin | LinkedIn | linkedin | 3000 | disabled"));

    cast_queue(&config_path)
        .args(["targets", "enable", "myspace"])
        .assert()
        .code(3);
}

#[test]
fn test_activity_log() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();
    let post_id = create_post(&config_path, &["--at", "+2h"]);
    cast_queue(&config_path)
        .args(["cancel", &post_id])
        .assert()
        .success();

    let output = cast_queue(&config_path)
        .args(["activity", "--format", "json"])
        .output()
        .unwrap();
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["action"], "post_canceled");
    assert_eq!(records[1]["action"], "post_created");
    assert_eq!(records[1]["metadata"]["post_id"], post_id.as_str());
}

#[test]
fn test_invalid_format_and_status() {
    let (_temp_dir, config_path, _db_path) = setup_test_env();

    cast_queue(&config_path)
        .args(["list", "--format", "yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'yaml'"));

    cast_queue(&config_path)
        .args(["list", "--status", "queued"])
        .assert()
        .code(3);
}

#[test]
fn test_missing_config() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.toml");

    cast_queue(missing.to_str().unwrap())
        .arg("list")
        .assert()
        .code(2);
}
