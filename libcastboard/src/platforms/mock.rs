//! Mock adapter for testing
//!
//! A configurable adapter that can succeed, reject, fault, panic, fail
//! transiently a number of times before succeeding, or delay. Clones share their call
//! counters so a test can keep a handle after handing the adapter over.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{DeliveryError, Result};
use crate::platforms::Adapter;
use crate::types::{DeliveryAttemptResult, Post, Target};

/// What the mock does once any transient failures are used up
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    Succeed,
    Reject(String),
    Fault(DeliveryError),
    /// Panic inside `deliver`, like a broken client library
    Panic(String),
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Target kind served (e.g. "twitter")
    pub kind: String,

    pub behaviour: MockBehaviour,

    /// Number of leading attempts answered with a transient network fault
    pub transient_failures: usize,

    /// Delay before completing an attempt (simulates network latency)
    pub delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            kind: "mock".to_string(),
            behaviour: MockBehaviour::Succeed,
            transient_failures: 0,
            delay: Duration::from_millis(0),
        }
    }
}

#[derive(Default)]
struct Calls {
    count: usize,
    delivered: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct MockAdapter {
    config: MockConfig,
    calls: Arc<Mutex<Calls>>,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    /// Create a mock adapter that always succeeds
    pub fn success(kind: &str) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock adapter whose target declines every post
    pub fn rejecting(kind: &str, reason: &str) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            behaviour: MockBehaviour::Reject(reason.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock adapter that raises the given fault on every attempt
    pub fn faulting(kind: &str, fault: DeliveryError) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            behaviour: MockBehaviour::Fault(fault),
            ..Default::default()
        })
    }

    /// Create a mock adapter that panics on every attempt
    pub fn panicking(kind: &str, message: &str) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            behaviour: MockBehaviour::Panic(message.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock adapter that fails with network faults `failures` times, then succeeds
    pub fn flaky(kind: &str, failures: usize) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            transient_failures: failures,
            ..Default::default()
        })
    }

    /// Create a mock adapter with a delay
    pub fn with_delay(kind: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            kind: kind.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Number of delivery attempts made
    pub fn call_count(&self) -> usize {
        self.lock_calls().count
    }

    /// `(post_id, target_id)` pairs successfully delivered
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.lock_calls().delivered.clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn kind(&self) -> &str {
        &self.config.kind
    }

    async fn deliver(&self, post: &Post, target: &Target) -> Result<DeliveryAttemptResult> {
        let attempt = {
            let mut calls = self.lock_calls();
            calls.count += 1;
            calls.count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if attempt <= self.config.transient_failures {
            return Err(DeliveryError::Network(format!(
                "mock {} connection reset (attempt {})",
                self.config.kind, attempt
            ))
            .into());
        }

        match &self.config.behaviour {
            MockBehaviour::Succeed => {
                self.lock_calls()
                    .delivered
                    .push((post.id.clone(), target.id.clone()));
                Ok(DeliveryAttemptResult::delivered(format!(
                    "{}_{}",
                    self.config.kind, attempt
                )))
            }
            MockBehaviour::Reject(reason) => Ok(DeliveryAttemptResult::rejected(reason.clone())),
            MockBehaviour::Fault(fault) => Err(fault.clone().into()),
            MockBehaviour::Panic(message) => panic!("{}", message),
        }
    }
}
