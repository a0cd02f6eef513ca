//! Authoring operations on queued posts
//!
//! Every successful mutation appends one activity record for the post's
//! owner. `published` posts are immutable apart from deletion.
//!
//! A post must name at least one target, every target must be enabled for
//! the owner, and the content must fit the smallest limit among them. An
//! owner can have at most [`DAILY_POST_LIMIT`] scheduled posts per UTC day.

use chrono::DateTime;
use std::sync::Arc;
use tracing::info;

use crate::activity::{Action, ActivityLog, NewActivity};
use crate::db::Database;
use crate::error::{CastboardError, Result};
use crate::scheduling::{ensure_future, format_timestamp};
use crate::store::{ContentStore, TargetRegistry};
use crate::types::{Post, PostStatus};

/// Scheduled posts one owner may have on a single UTC day
pub const DAILY_POST_LIMIT: usize = 10;

const SECONDS_PER_DAY: i64 = 86_400;

/// Request to create a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner: String,
    pub title: String,
    pub content: String,
    pub image_ref: Option<String>,
    pub scheduled_at: i64,
    pub target_ids: Vec<String>,
    /// Store as `draft` instead of `scheduled`
    pub draft: bool,
}

/// Fields to replace on an existing post; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_ref: Option<String>,
    pub scheduled_at: Option<i64>,
    /// Replaces the target set; every target restarts as pending
    pub target_ids: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct QueueService {
    db: Arc<Database>,
}

impl QueueService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewPost) -> Result<Post> {
        validate_text("title", &request.title)?;
        validate_text("content", &request.content)?;
        if !request.draft {
            ensure_future(request.scheduled_at, now())?;
        }
        self.validate_selection(&request.owner, &request.target_ids, &request.content)
            .await?;
        if !request.draft {
            self.ensure_daily_capacity(&request.owner, request.scheduled_at, None)
                .await?;
        }

        let mut post = Post::new(
            request.owner,
            request.title,
            request.content,
            request.scheduled_at,
            &request.target_ids,
        );
        post.image_ref = request.image_ref;
        if request.draft {
            post.status = PostStatus::Draft;
        }

        self.db.create_post(&post).await?;
        info!(post_id = %post.id, owner = %post.owner, status = %post.status, "Post created");

        self.record(&post, Action::PostCreated, format!("Created post: {}", post.title))
            .await?;
        Ok(post)
    }

    pub async fn update(&self, post_id: &str, update: PostUpdate) -> Result<Post> {
        let mut post = self.require(post_id).await?;
        if post.status == PostStatus::Published {
            return Err(CastboardError::InvalidInput(format!(
                "Post {} is already published and cannot be edited",
                post_id
            )));
        }

        if let Some(title) = update.title {
            validate_text("title", &title)?;
            post.title = title;
        }
        if let Some(content) = update.content {
            validate_text("content", &content)?;
            post.content = content;
        }
        if let Some(image_ref) = update.image_ref {
            post.image_ref = Some(image_ref);
        }
        if let Some(at) = update.scheduled_at {
            ensure_future(at, now())?;
            post.scheduled_at = at;
        }
        if let Some(target_ids) = update.target_ids {
            post.set_targets(&target_ids);
        }

        self.validate_selection(&post.owner, &post.target_ids(), &post.content)
            .await?;
        if post.status == PostStatus::Scheduled {
            self.ensure_daily_capacity(&post.owner, post.scheduled_at, Some(post.id.as_str()))
                .await?;
        }

        self.db.save(&post).await?;
        self.record(&post, Action::PostUpdated, format!("Updated post: {}", post.title))
            .await?;
        Ok(post)
    }

    /// `draft` -> `scheduled`, at `at` or at the draft's stored time
    pub async fn submit(&self, post_id: &str, at: Option<i64>) -> Result<Post> {
        let mut post = self.require(post_id).await?;
        post.submit()?;
        if let Some(at) = at {
            post.scheduled_at = at;
        }
        ensure_future(post.scheduled_at, now())?;
        self.validate_selection(&post.owner, &post.target_ids(), &post.content)
            .await?;
        self.ensure_daily_capacity(&post.owner, post.scheduled_at, Some(post.id.as_str()))
            .await?;

        self.db.save(&post).await?;
        info!(post_id = %post.id, scheduled_at = post.scheduled_at, "Draft submitted");
        self.record(&post, Action::PostUpdated, format!("Updated post: {}", post.title))
            .await?;
        Ok(post)
    }

    /// `scheduled` -> `draft`
    pub async fn cancel(&self, post_id: &str) -> Result<Post> {
        let mut post = self.require(post_id).await?;
        post.cancel()?;

        self.db.save(&post).await?;
        info!(post_id = %post.id, "Post canceled");
        self.record(
            &post,
            Action::PostCanceled,
            format!("Canceled scheduled post: {}", post.title),
        )
        .await?;
        Ok(post)
    }

    /// Move a non-published post to `scheduled` at a future time.
    ///
    /// A failed post has every target reset to pending.
    pub async fn reschedule(&self, post_id: &str, at: i64) -> Result<Post> {
        ensure_future(at, now())?;
        let mut post = self.require(post_id).await?;
        post.reschedule(at)?;
        self.ensure_daily_capacity(&post.owner, at, Some(post.id.as_str()))
            .await?;

        self.db.save(&post).await?;
        info!(post_id = %post.id, scheduled_at = at, "Post rescheduled");

        let entry = NewActivity::new(
            &post.owner,
            Action::PostRescheduled,
            format!("Rescheduled post: {} to {}", post.title, format_timestamp(at)),
        )
        .with("post_id", post.id.as_str())
        .with("scheduled_at", at);
        self.db.record(entry).await?;
        Ok(post)
    }

    pub async fn delete(&self, post_id: &str) -> Result<()> {
        let post = self.require(post_id).await?;
        self.db.delete_post(post_id).await?;
        info!(post_id = %post.id, "Post deleted");
        self.record(&post, Action::PostDeleted, format!("Deleted post: {}", post.title))
            .await
    }

    pub async fn get(&self, post_id: &str) -> Result<Option<Post>> {
        self.db.get(post_id).await
    }

    pub async fn list(&self, status: Option<PostStatus>, owner: Option<&str>) -> Result<Vec<Post>> {
        self.db.list_posts(status, owner).await
    }

    async fn require(&self, post_id: &str) -> Result<Post> {
        self.db
            .get(post_id)
            .await?
            .ok_or_else(|| CastboardError::NotFound(format!("post '{}'", post_id)))
    }

    async fn validate_selection(&self, owner: &str, target_ids: &[String], content: &str) -> Result<()> {
        if target_ids.is_empty() {
            return Err(CastboardError::InvalidInput(
                "At least one target must be selected".to_string(),
            ));
        }

        let mut smallest: Option<(usize, String)> = None;
        for id in target_ids {
            let target = self
                .db
                .target(id)
                .await?
                .ok_or_else(|| CastboardError::InvalidInput(format!("Unknown target '{}'", id)))?;
            if !self.db.is_enabled(owner, id).await? {
                return Err(CastboardError::InvalidInput(format!(
                    "Target '{}' is not enabled for owner '{}'",
                    id, owner
                )));
            }
            if let Some(limit) = target.max_content_length {
                if smallest.as_ref().map_or(true, |(current, _)| limit < *current) {
                    smallest = Some((limit, target.name));
                }
            }
        }

        if let Some((limit, name)) = smallest {
            let length = content.chars().count();
            if length > limit {
                return Err(CastboardError::InvalidInput(format!(
                    "Content is {} characters but the selected targets allow at most {} ({})",
                    length, limit, name
                )));
            }
        }
        Ok(())
    }

    async fn ensure_daily_capacity(&self, owner: &str, at: i64, exclude: Option<&str>) -> Result<()> {
        let day_start = at - at.rem_euclid(SECONDS_PER_DAY);
        let scheduled = self
            .db
            .count_scheduled_between(owner, day_start, day_start + SECONDS_PER_DAY, exclude)
            .await?;

        if scheduled >= DAILY_POST_LIMIT {
            let day = DateTime::from_timestamp(day_start, 0)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| day_start.to_string());
            return Err(CastboardError::InvalidInput(format!(
                "Daily limit of {} scheduled posts reached for {}",
                DAILY_POST_LIMIT, day
            )));
        }
        Ok(())
    }

    async fn record(&self, post: &Post, action: Action, details: String) -> Result<()> {
        let entry = NewActivity::new(&post.owner, action, details).with("post_id", post.id.as_str());
        self.db.record(entry).await
    }
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CastboardError::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
