//! Simulated delivery
//!
//! Stands in for real target integrations: every attempt succeeds and is
//! assigned a reference of the form `<kind>_<seven digits>`.

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;
use crate::platforms::Adapter;
use crate::types::{DeliveryAttemptResult, Post, Target};

pub struct SimulatedAdapter {
    kind: String,
}

impl SimulatedAdapter {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for SimulatedAdapter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn deliver(&self, post: &Post, target: &Target) -> Result<DeliveryAttemptResult> {
        let number: u32 = rand::thread_rng().gen_range(1_000_000..=9_999_999);
        let external_ref = format!("{}_{}", self.kind, number);

        tracing::debug!(
            post_id = %post.id,
            target = %target.id,
            external_ref = %external_ref,
            "Simulated delivery"
        );

        Ok(DeliveryAttemptResult::delivered(external_ref))
    }
}
