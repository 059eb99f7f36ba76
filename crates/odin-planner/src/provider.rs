// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use crate::protocol::{PlannerInput, PlannerOutput, SufficiencyRequest, SufficiencyVerdict};

/// The planner model behind the plan-act loop.  One call per iteration.
#[async_trait]
pub trait PlannerProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Decide the next action for the given input.
    async fn plan(&self, input: &PlannerInput) -> anyhow::Result<PlannerOutput>;
}

/// The cheap model that judges whether cached content carries enough
/// context for a proposed edit.
#[async_trait]
pub trait SufficiencyValidator: Send + Sync {
    async fn validate(&self, request: &SufficiencyRequest) -> anyhow::Result<SufficiencyVerdict>;
}

/// The cheap model that extracts/transforms fetched web content according
/// to a caller-supplied prompt (used by web_fetch).
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, prompt: &str, content: &str) -> anyhow::Result<String>;
}
