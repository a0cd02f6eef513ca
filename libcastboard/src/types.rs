//! Core types for Castboard

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CastboardError, DbError, Result};

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = CastboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(DbError::Corrupt(format!("unknown post status '{}'", other)).into()),
        }
    }
}

/// Delivery state of a post on one target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Pending,
    Published,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Published => "published",
            TargetStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = CastboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TargetStatus::Pending),
            "published" => Ok(TargetStatus::Published),
            "failed" => Ok(TargetStatus::Failed),
            other => Err(DbError::Corrupt(format!("unknown target status '{}'", other)).into()),
        }
    }
}

/// A post's attachment to one target, in attachment order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostTarget {
    pub target_id: String,
    pub status: TargetStatus,
    /// Identifier the target assigned to the delivered content
    pub external_ref: Option<String>,
    pub error_message: Option<String>,
}

impl PostTarget {
    pub fn pending(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            status: TargetStatus::Pending,
            external_ref: None,
            error_message: None,
        }
    }

    pub fn mark_published(&mut self, external_ref: Option<String>) {
        self.status = TargetStatus::Published;
        self.external_ref = external_ref;
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = TargetStatus::Failed;
        self.external_ref = None;
        self.error_message = Some(error_message.into());
    }

    pub fn reset(&mut self) {
        self.status = TargetStatus::Pending;
        self.external_ref = None;
        self.error_message = None;
    }
}

/// A unit of content scheduled for delivery to one or more targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub content: String,
    pub image_ref: Option<String>,
    /// Unix timestamp after which the post is eligible for delivery
    pub scheduled_at: i64,
    pub status: PostStatus,
    pub targets: Vec<PostTarget>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    /// Create a scheduled post with every target pending
    pub fn new(
        owner: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        scheduled_at: i64,
        target_ids: &[String],
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.into(),
            title: title.into(),
            content: content.into(),
            image_ref: None,
            scheduled_at,
            status: PostStatus::Scheduled,
            targets: dedup_targets(target_ids),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.target_id.clone()).collect()
    }

    pub fn target_mut(&mut self, target_id: &str) -> Option<&mut PostTarget> {
        self.targets.iter_mut().find(|t| t.target_id == target_id)
    }

    /// True when there is at least one target and all of them are published
    pub fn all_targets_published(&self) -> bool {
        !self.targets.is_empty()
            && self
                .targets
                .iter()
                .all(|t| t.status == TargetStatus::Published)
    }

    /// Replace the attached targets, all pending
    pub fn set_targets(&mut self, target_ids: &[String]) {
        self.targets = dedup_targets(target_ids);
    }

    /// draft -> scheduled
    pub fn submit(&mut self) -> Result<()> {
        self.transition(PostStatus::Draft, PostStatus::Scheduled)
    }

    /// scheduled -> draft
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(PostStatus::Scheduled, PostStatus::Draft)
    }

    /// Move any non-published post back to scheduled at a new time.
    ///
    /// Target statuses are reset to pending when the post had failed.
    pub fn reschedule(&mut self, scheduled_at: i64) -> Result<()> {
        if self.status == PostStatus::Published {
            return Err(invalid_transition(self.status, PostStatus::Scheduled));
        }
        if self.status == PostStatus::Failed {
            self.targets.iter_mut().for_each(PostTarget::reset);
        }
        self.scheduled_at = scheduled_at;
        self.status = PostStatus::Scheduled;
        Ok(())
    }

    /// Derive the terminal status from the target statuses.
    ///
    /// Only valid for a scheduled post; an empty target set is a failure.
    pub fn settle(&mut self) -> Result<PostStatus> {
        if self.status != PostStatus::Scheduled {
            let to = if self.all_targets_published() {
                PostStatus::Published
            } else {
                PostStatus::Failed
            };
            return Err(invalid_transition(self.status, to));
        }
        self.status = if self.all_targets_published() {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };
        Ok(self.status)
    }

    fn transition(&mut self, from: PostStatus, to: PostStatus) -> Result<()> {
        if self.status != from {
            return Err(invalid_transition(self.status, to));
        }
        self.status = to;
        Ok(())
    }
}

fn invalid_transition(from: PostStatus, to: PostStatus) -> CastboardError {
    CastboardError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Keep first occurrence order; a target is attached at most once
fn dedup_targets(target_ids: &[String]) -> Vec<PostTarget> {
    let mut targets: Vec<PostTarget> = Vec::with_capacity(target_ids.len());
    for id in target_ids {
        if !targets.iter().any(|t| &t.target_id == id) {
            targets.push(PostTarget::pending(id.clone()));
        }
    }
    targets
}

/// A publishing destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    /// Selects the adapter used for delivery (e.g. "twitter")
    pub kind: String,
    /// Maximum content length in characters; `None` means unlimited
    pub max_content_length: Option<usize>,
}

/// Outcome of one delivery attempt of a post to a target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryAttemptResult {
    pub success: bool,
    pub external_ref: Option<String>,
    pub error: Option<String>,
}

impl DeliveryAttemptResult {
    pub fn delivered(external_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            external_ref: Some(external_ref.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_ref: None,
            error: Some(error.into()),
        }
    }
}
