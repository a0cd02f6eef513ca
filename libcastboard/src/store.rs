//! Storage interfaces consumed by the publishing pipeline
//!
//! [`Database`](crate::db::Database) implements both traits; tests may wrap
//! or replace it to inject faults.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Post, Target};

/// Durable record of posts and their per-target delivery state
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Every post with status `scheduled`, `scheduled_at <= now` and no live
    /// claim, ordered by `scheduled_at` then id
    async fn select_due(&self, now: i64) -> Result<Vec<Post>>;

    /// Reserve a due post for one cycle until `until`.
    ///
    /// Returns `false` when the post is no longer scheduled or another cycle
    /// holds a live claim on it.
    async fn claim(&self, post_id: &str, now: i64, until: i64) -> Result<bool>;

    /// Persist the full post state, target statuses included, atomically.
    /// Clears any claim.
    async fn save(&self, post: &Post) -> Result<()>;

    /// Like [`save`](Self::save), but only while the post is still scheduled
    /// and carries the claim `claimed_until` that the caller took.
    ///
    /// Returns `false` and writes nothing once that claim has lapsed and been
    /// taken over or settled by another cycle.
    async fn save_claimed(&self, post: &Post, claimed_until: i64) -> Result<bool>;

    async fn get(&self, post_id: &str) -> Result<Option<Post>>;
}

/// Known targets and per-owner enablement
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn target(&self, target_id: &str) -> Result<Option<Target>>;

    /// `false` for unknown targets and for targets the owner never enabled
    async fn is_enabled(&self, owner: &str, target_id: &str) -> Result<bool>;

    /// Content length limit of a target.
    ///
    /// Errors with `NotFound` for unknown targets; `Ok(None)` means unlimited.
    async fn limit_for(&self, target_id: &str) -> Result<Option<usize>>;
}
