//! Publishing cycle
//!
//! One call to [`Publisher::run_cycle`] selects every due post and drives each
//! of them to `published` or `failed`. Posts are independent: a fault while
//! handling one post is contained at the per-post boundary and the cycle moves
//! on. Only a failure to select the due set aborts the cycle.
//!
//! Per post, in order:
//! 1. claim the post for the length of the lease (skip it if another cycle
//!    holds it)
//! 2. attempt every attached target in attachment order; registry checks run
//!    before the adapter is called, and a failing target never stops the loop
//! 3. derive the post status from the target statuses
//! 4. persist the post under its claim, then append the activity record
//! 5. signal that the owner's cached aggregates are stale
//!
//! A post whose claim lapsed before step 4 and was taken over by another
//! cycle is left to that cycle and reported as skipped.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::activity::{ActivityLog, NewActivity};
use crate::config::{backoff_delay, SchedulingConfig, MAX_ATTEMPTS_LIMIT};
use crate::error::Result;
use crate::platforms::{Adapter, Adapters};
use crate::service::events::{Event, EventBus};
use crate::store::{ContentStore, TargetRegistry};
use crate::types::{DeliveryAttemptResult, Post, PostStatus, Target};

/// Failure reason for a post without targets
pub const NO_TARGETS_REASON: &str = "No targets selected";

/// Failure reason when at least one target failed without a fault
pub const TARGETS_FAILED_REASON: &str = "One or more platforms failed";

/// Explicit per-cycle context
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub cycle_id: String,
    /// What started the cycle (e.g. "cast-send", "manual")
    pub trigger: String,
    /// Clock value used for due selection and claims
    pub now: i64,
}

impl CycleContext {
    pub fn new(trigger: &str) -> Self {
        Self::at(trigger, chrono::Utc::now().timestamp())
    }

    pub fn at(trigger: &str, now: i64) -> Self {
        Self {
            cycle_id: uuid::Uuid::new_v4().to_string(),
            trigger: trigger.to_string(),
            now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostOutcome {
    Published { post_id: String },
    Failed { post_id: String, reason: String },
    /// Claimed by another cycle, or the claim lapsed before saving
    Skipped { post_id: String },
}

impl PostOutcome {
    pub fn post_id(&self) -> &str {
        match self {
            PostOutcome::Published { post_id }
            | PostOutcome::Failed { post_id, .. }
            | PostOutcome::Skipped { post_id } => post_id,
        }
    }
}

/// Result of one cycle; outcomes are in due-set order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: String,
    pub now: i64,
    pub outcomes: Vec<PostOutcome>,
}

impl CycleReport {
    pub fn due(&self) -> usize {
        self.outcomes.len()
    }

    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Published { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Skipped { .. }))
    }

    pub fn outcome_for(&self, post_id: &str) -> Option<&PostOutcome> {
        self.outcomes.iter().find(|o| o.post_id() == post_id)
    }

    fn count(&self, pred: impl Fn(&PostOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Tunables for a publisher
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub workers: usize,
    pub claim_lease: u64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        (&SchedulingConfig::default()).into()
    }
}

impl From<&SchedulingConfig> for PublisherSettings {
    fn from(config: &SchedulingConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            claim_lease: config.claim_lease.max(1),
            max_attempts: config.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            retry_delay: config.retry_delay(),
        }
    }
}

/// What happened to one target of a post
enum TargetAttempt {
    Published {
        name: String,
        external_ref: Option<String>,
    },
    /// Validation or delivery failure reported as data
    Failed(String),
    /// The attempt could not be made
    Fault(String),
}

/// Orchestrates publishing cycles
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ContentStore>,
    registry: Arc<dyn TargetRegistry>,
    activity: Arc<dyn ActivityLog>,
    adapters: Adapters,
    event_bus: EventBus,
    settings: PublisherSettings,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ContentStore>,
        registry: Arc<dyn TargetRegistry>,
        activity: Arc<dyn ActivityLog>,
        adapters: Adapters,
        event_bus: EventBus,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            store,
            registry,
            activity,
            adapters,
            event_bus,
            settings,
        }
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Run one publishing cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the due set cannot be selected; no post is
    /// touched in that case. Everything else is reported per post in the
    /// returned [`CycleReport`].
    pub async fn run_cycle(&self, ctx: &CycleContext) -> Result<CycleReport> {
        let due = self.store.select_due(ctx.now).await.map_err(|e| {
            error!(cycle_id = %ctx.cycle_id, "Failed to select due posts: {}", e);
            e
        })?;

        info!(
            cycle_id = %ctx.cycle_id,
            trigger = %ctx.trigger,
            due = due.len(),
            "Starting publishing cycle"
        );
        self.event_bus.emit(Event::CycleStarted {
            cycle_id: ctx.cycle_id.clone(),
            trigger: ctx.trigger.clone(),
            due: due.len(),
        });

        let outcomes: Vec<PostOutcome> = stream::iter(due)
            .map(|post| self.process_post(ctx, post))
            .buffered(self.settings.workers)
            .collect()
            .await;

        let report = CycleReport {
            cycle_id: ctx.cycle_id.clone(),
            trigger: ctx.trigger.clone(),
            now: ctx.now,
            outcomes,
        };

        info!(
            cycle_id = %ctx.cycle_id,
            published = report.published(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Publishing cycle completed"
        );
        self.event_bus.emit(Event::CycleCompleted {
            cycle_id: report.cycle_id.clone(),
            published: report.published(),
            failed: report.failed(),
            skipped: report.skipped(),
        });

        Ok(report)
    }

    /// Per-post boundary: an error or panic from the post's pipeline ends up
    /// as a failed outcome with the raw error text. The post keeps its claim.
    async fn process_post(&self, ctx: &CycleContext, post: Post) -> PostOutcome {
        let post_id = post.id.clone();
        let owner = post.owner.clone();
        let title = post.title.clone();

        let reason = match AssertUnwindSafe(self.publish_post(ctx, post))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("Publishing panicked: {}", panic_message(&*panic)),
        };

        error!(
            cycle_id = %ctx.cycle_id,
            post_id = %post_id,
            owner = %owner,
            "Failed to process post: {}",
            reason
        );
        self.audit(NewActivity::publish_failed(&owner, &post_id, &title, &reason))
            .await;
        self.event_bus.emit(Event::PostPublishFailed {
            post_id: post_id.clone(),
            owner: owner.clone(),
            reason: reason.clone(),
        });
        self.mark_stale(&owner);
        PostOutcome::Failed { post_id, reason }
    }

    async fn publish_post(&self, ctx: &CycleContext, mut post: Post) -> Result<PostOutcome> {
        let until = ctx.now + self.settings.claim_lease as i64;
        if !self.store.claim(&post.id, ctx.now, until).await? {
            debug!(post_id = %post.id, "Post claimed by another cycle, skipping");
            return Ok(PostOutcome::Skipped { post_id: post.id });
        }

        let mut published_names = Vec::new();
        let mut fault: Option<String> = None;

        if post.targets.is_empty() {
            warn!(post_id = %post.id, owner = %post.owner, "Post has no targets");
        }

        let post_id = post.id.clone();
        for target_id in post.target_ids() {
            let attempt = self.attempt_target(&post, &target_id).await;
            let Some(slot) = post.target_mut(&target_id) else {
                continue;
            };
            match attempt {
                TargetAttempt::Published { name, external_ref } => {
                    slot.mark_published(external_ref);
                    published_names.push(name);
                }
                TargetAttempt::Failed(message) => {
                    warn!(post_id = %post_id, target = %target_id, "Target failed: {}", message);
                    slot.mark_failed(message);
                }
                TargetAttempt::Fault(message) => {
                    error!(post_id = %post_id, target = %target_id, "Target fault: {}", message);
                    slot.mark_failed(message.clone());
                    fault.get_or_insert(message);
                }
            }
        }

        let status = post.settle()?;
        if !self.store.save_claimed(&post, until).await? {
            warn!(
                cycle_id = %ctx.cycle_id,
                post_id = %post.id,
                "Claim lapsed before the result was saved, leaving the post to the cycle holding it"
            );
            return Ok(PostOutcome::Skipped { post_id: post.id });
        }

        let outcome = match status {
            PostStatus::Published => {
                info!(post_id = %post.id, owner = %post.owner, "Post published");
                self.audit(NewActivity::published(&post, published_names))
                    .await;
                self.event_bus.emit(Event::PostPublished {
                    post_id: post.id.clone(),
                    owner: post.owner.clone(),
                });
                PostOutcome::Published {
                    post_id: post.id.clone(),
                }
            }
            _ => {
                let reason = if post.targets.is_empty() {
                    NO_TARGETS_REASON.to_string()
                } else {
                    fault.unwrap_or_else(|| TARGETS_FAILED_REASON.to_string())
                };
                info!(
                    post_id = %post.id,
                    owner = %post.owner,
                    "Post failed to publish: {}",
                    reason
                );
                self.audit(NewActivity::publish_failed(
                    &post.owner,
                    &post.id,
                    &post.title,
                    &reason,
                ))
                .await;
                self.event_bus.emit(Event::PostPublishFailed {
                    post_id: post.id.clone(),
                    owner: post.owner.clone(),
                    reason: reason.clone(),
                });
                PostOutcome::Failed {
                    post_id: post.id.clone(),
                    reason,
                }
            }
        };

        self.mark_stale(&post.owner);
        Ok(outcome)
    }

    /// Registry checks, then delivery
    async fn attempt_target(&self, post: &Post, target_id: &str) -> TargetAttempt {
        let target = match self.registry.target(target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => return TargetAttempt::Failed(format!("Unknown target '{}'", target_id)),
            Err(e) => return TargetAttempt::Fault(e.to_string()),
        };

        match self.registry.is_enabled(&post.owner, target_id).await {
            Ok(true) => {}
            Ok(false) => {
                return TargetAttempt::Failed(format!(
                    "Target '{}' is not enabled for this owner",
                    target.name
                ))
            }
            Err(e) => return TargetAttempt::Fault(e.to_string()),
        }

        match self.registry.limit_for(target_id).await {
            Ok(Some(limit)) => {
                let length = post.content.chars().count();
                if length > limit {
                    return TargetAttempt::Failed(format!(
                        "Content exceeds {} character limit ({} characters)",
                        limit, length
                    ));
                }
            }
            Ok(None) => {}
            Err(e) => return TargetAttempt::Fault(e.to_string()),
        }

        let Some(adapter) = self.adapters.get(&target.kind) else {
            return TargetAttempt::Failed(format!(
                "No adapter available for target kind '{}'",
                target.kind
            ));
        };

        match self.deliver_with_retry(adapter.as_ref(), post, &target).await {
            Ok(result) if result.success => TargetAttempt::Published {
                name: target.name,
                external_ref: result.external_ref,
            },
            Ok(result) => TargetAttempt::Failed(
                result
                    .error
                    .unwrap_or_else(|| format!("{} declined the post", target.name)),
            ),
            Err(e) => TargetAttempt::Fault(e.to_string()),
        }
    }

    /// Retry transient faults with exponential backoff
    async fn deliver_with_retry(
        &self,
        adapter: &dyn Adapter,
        post: &Post,
        target: &Target,
    ) -> Result<DeliveryAttemptResult> {
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 1;

        loop {
            match adapter.deliver(post, target).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            post_id = %post.id,
                            target = %target.id,
                            "Delivered on attempt {}",
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = backoff_delay(self.settings.retry_delay, attempt);
                    warn!(
                        post_id = %post.id,
                        target = %target.id,
                        "Transient error (attempt {}/{}): {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn audit(&self, entry: NewActivity) {
        let owner = entry.owner.clone();
        let action = entry.action;
        if let Err(e) = self.activity.record(entry).await {
            error!(owner = %owner, action = %action, "Failed to write activity record: {}", e);
        }
    }

    fn mark_stale(&self, owner: &str) {
        self.event_bus.emit(Event::OwnerStale {
            owner: owner.to_string(),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
