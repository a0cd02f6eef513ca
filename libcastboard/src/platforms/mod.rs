//! Publishing adapters
//!
//! An adapter performs a single delivery attempt of a post to one target and
//! reports the outcome. Adapters are selected by the target's `kind`.
//!
//! ```no_run
//! use libcastboard::platforms::{Adapters, simulated::SimulatedAdapter};
//! use std::sync::Arc;
//!
//! let mut adapters = Adapters::new();
//! adapters.register(Arc::new(SimulatedAdapter::new("twitter")));
//! assert!(adapters.get("twitter").is_some());
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::types::{DeliveryAttemptResult, Post, Target};

pub mod simulated;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

/// One delivery attempt of a post to a target
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Target kind this adapter serves (e.g. "twitter")
    fn kind(&self) -> &str;

    /// Attempt delivery.
    ///
    /// A target that declines the content is reported as
    /// `Ok(DeliveryAttemptResult { success: false, .. })`. `Err` is reserved
    /// for faults where the attempt could not be made at all (network,
    /// rate limiting, adapter bugs); transient faults may be retried.
    async fn deliver(&self, post: &Post, target: &Target) -> Result<DeliveryAttemptResult>;
}

/// Adapters keyed by target kind
#[derive(Clone, Default)]
pub struct Adapters {
    by_kind: HashMap<String, Arc<dyn Adapter>>,
}

impl Adapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same kind
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.by_kind.insert(adapter.kind().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Adapter>> {
        self.by_kind.get(kind).cloned()
    }
}

/// Build the adapter set for every target kind in the configuration
pub fn create_adapters(config: &Config) -> Adapters {
    let mut adapters = Adapters::new();
    for target in &config.targets {
        if adapters.get(&target.kind).is_none() {
            tracing::debug!("Registering simulated adapter for kind '{}'", target.kind);
            adapters.register(Arc::new(simulated::SimulatedAdapter::new(&target.kind)));
        }
    }
    adapters
}
