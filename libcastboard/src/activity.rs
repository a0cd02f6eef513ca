//! Append-only activity log
//!
//! Every lifecycle transition of a post produces exactly one record. Records
//! are written once and never updated or deleted by the library.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::Result;
use crate::types::Post;

/// Action tags stored with each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PostCreated,
    PostUpdated,
    PostCanceled,
    PostRescheduled,
    PostDeleted,
    PostPublished,
    PostPublishFailed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::PostCreated => "post_created",
            Action::PostUpdated => "post_updated",
            Action::PostCanceled => "post_canceled",
            Action::PostRescheduled => "post_rescheduled",
            Action::PostDeleted => "post_deleted",
            Action::PostPublished => "post_published",
            Action::PostPublishFailed => "post_publish_failed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub owner: String,
    pub action: Action,
    pub details: String,
    pub metadata: Value,
}

impl NewActivity {
    pub fn new(owner: impl Into<String>, action: Action, details: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            action,
            details: details.into(),
            metadata: json!({}),
        }
    }

    /// Add a metadata field; non-object metadata is replaced
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.metadata.is_object() {
            self.metadata = json!({});
        }
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Record for a post that reached `published`
    pub fn published(post: &Post, target_names: Vec<String>) -> Self {
        Self::new(
            &post.owner,
            Action::PostPublished,
            format!("Post published: {}", post.title),
        )
        .with("post_id", post.id.as_str())
        .with("platforms", target_names)
    }

    /// Record for a post that ended `failed`
    pub fn publish_failed(owner: &str, post_id: &str, title: &str, error: &str) -> Self {
        Self::new(
            owner,
            Action::PostPublishFailed,
            format!("Failed to publish post: {}", title),
        )
        .with("post_id", post_id)
        .with("error", error)
    }
}

/// A stored activity record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRecord {
    pub id: i64,
    pub owner: String,
    pub action: String,
    pub details: String,
    pub metadata: Value,
    pub created_at: i64,
}

/// Sink for activity records.
///
/// The publishing pipeline only appends; reading back is offered for
/// dashboards and tests.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, entry: NewActivity) -> Result<()>;

    /// Records for one owner, newest first
    async fn records_for(&self, owner: &str, limit: usize) -> Result<Vec<ActivityRecord>>;
}
