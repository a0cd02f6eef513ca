//! Integration tests for the cast-send scheduler trigger

use assert_cmd::Command;
use libcastboard::{ActivityLog, ContentStore, Database, Post, PostStatus, Target};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Write a config pointing at a fresh database and seed the registry
async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("castboard.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduling]
poll_interval = 1
retry_delay = 0

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

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    db.seed_targets(&[
        target("twitter", "Twitter", 280),
        target("linkedin", "LinkedIn", 3000),
    ])
    .await
    .unwrap();
    db.set_target_enabled("alice", "twitter", true).await.unwrap();
    db.set_target_enabled("alice", "linkedin", true).await.unwrap();
    db.close().await;

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

fn target(id: &str, name: &str, limit: usize) -> Target {
    Target {
        id: id.to_string(),
        name: name.to_string(),
        kind: id.to_string(),
        max_content_length: Some(limit),
    }
}

/// Create a scheduled post that fell due 10 seconds ago
async fn create_due_post(db_path: &str, content: &str, targets: &[&str]) -> String {
    let db = Database::new(db_path).await.unwrap();
    let now = chrono::Utc::now().timestamp();
    let ids: Vec<String> = targets.iter().map(|s| s.to_string()).collect();

    let post = Post::new("alice", "Scheduled", content, now - 10, &ids);
    db.create_post(&post).await.unwrap();
    db.close().await;
    post.id
}

fn cast_send(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("cast-send").unwrap();
    cmd.env("CASTBOARD_CONFIG", config_path)
        .env_remove("CASTBOARD_DB_PATH")
        .env_remove("CASTBOARD_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

#[tokio::test]
async fn test_help_describes_exit_codes() {
    Command::cargo_bin("cast-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[tokio::test]
async fn test_once_with_nothing_due() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    cast_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 due, 0 published, 0 failed"));
}

#[tokio::test]
async fn test_once_publishes_due_post() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let post_id = create_due_post(&db_path, "Hello world", &["twitter", "linkedin"]).await;

    cast_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 due, 1 published, 0 failed"));

    let db = Database::new(&db_path).await.unwrap();
    let post = db.get(&post_id).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Published);
    assert!(post.targets[0]
        .external_ref
        .as_deref()
        .unwrap()
        .starts_with("twitter_"));

    let records = db.records_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "post_published");
}

#[tokio::test]
async fn test_failed_posts_do_not_fail_the_cycle() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let long = "x".repeat(300);
    let post_id = create_due_post(&db_path, &long, &["twitter"]).await;
    create_due_post(&db_path, "No targets", &[]).await;

    cast_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 due, 0 published, 2 failed"));

    let db = Database::new(&db_path).await.unwrap();
    assert_eq!(
        db.get(&post_id).await.unwrap().unwrap().status,
        PostStatus::Failed
    );
}

#[tokio::test]
async fn test_once_json_summary() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let post_id = create_due_post(&db_path, "Hello", &["twitter"]).await;

    let output = cast_send(&config_path)
        .args(["--once", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["trigger"], "cast-send");
    assert_eq!(report["outcomes"][0]["outcome"], "published");
    assert_eq!(report["outcomes"][0]["post_id"], post_id.as_str());
}

#[tokio::test]
async fn test_verbose_json_logging() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    cast_send(&config_path)
        .args(["--once", "--verbose", "--log-format", "json"])
        .assert()
        .success()
        .stderr(predicate::str::contains(r#""message":"Starting publishing cycle""#));
}

#[tokio::test]
async fn test_invalid_log_format_rejected() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    cast_send(&config_path)
        .args(["--once", "--log-format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}

#[tokio::test]
async fn test_missing_config_exits_with_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    cast_send(missing.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[tokio::test]
async fn test_unparsable_config_exits_with_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");
    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    cast_send(invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2);
}

#[tokio::test]
async fn test_invalid_scheduling_values_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"{}\"\n\n[scheduling]\nworkers = 0\n",
            temp_dir
                .path()
                .join("castboard.db")
                .display()
                .to_string()
                .replace('\\', "/")
        ),
    )
    .unwrap();

    cast_send(config_path.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("scheduling.workers"));
}

#[tokio::test]
async fn test_db_path_env_override() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let override_path = temp_dir.path().join("override").join("other.db");

    cast_send(&config_path)
        .env("CASTBOARD_DB_PATH", override_path.to_str().unwrap())
        .arg("--once")
        .assert()
        .success();

    assert!(override_path.exists());
}
