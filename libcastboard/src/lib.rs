//! Castboard - scheduled multi-target publishing
//!
//! This library holds the publishing pipeline: the content store and target
//! registry (SQLite), publishing adapters, the cycle orchestrator and the
//! authoring operations used by the `cast-send` and `cast-queue` binaries.

pub mod activity;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod scheduling;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use activity::{Action, ActivityLog, ActivityRecord, NewActivity};
pub use config::Config;
pub use db::Database;
pub use error::{CastboardError, Result};
pub use store::{ContentStore, TargetRegistry};
pub use types::{DeliveryAttemptResult, Post, PostStatus, PostTarget, Target, TargetStatus};
