// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::protocol::{PlannerInput, PlannerOutput, SufficiencyRequest, SufficiencyVerdict};
use crate::provider::{ContentExtractor, PlannerProvider, SufficiencyValidator};

/// Deterministic planner for tests: always declares the task complete and
/// echoes the latest message in the explanation.
#[derive(Default)]
pub struct CompletingPlanner;

#[async_trait]
impl PlannerProvider for CompletingPlanner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn plan(&self, input: &PlannerInput) -> anyhow::Result<PlannerOutput> {
        Ok(PlannerOutput::completed(format!(
            "MOCK: {}",
            input.latest_message
        )))
    }
}

/// A pre-scripted planner.  Each call to `plan` pops the next output from
/// the front of the queue.  This lets tests specify exact iteration
/// sequences — including tool calls — without network access.
pub struct ScriptedPlanner {
    scripts: Arc<Mutex<Vec<PlannerOutput>>>,
    /// The last `PlannerInput` seen by this planner.  Written on each
    /// `plan()` call so tests can inspect what was sent.
    pub last_input: Arc<Mutex<Option<PlannerInput>>>,
    /// Every input seen, in call order.
    pub inputs: Arc<Mutex<Vec<PlannerInput>>>,
}

impl ScriptedPlanner {
    /// Build a planner from an ordered list of outputs.
    pub fn new(scripts: Vec<PlannerOutput>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_input: Arc::new(Mutex::new(None)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Remaining unconsumed scripts.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl PlannerProvider for ScriptedPlanner {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn plan(&self, input: &PlannerInput) -> anyhow::Result<PlannerOutput> {
        *self.last_input.lock().unwrap() = Some(input.clone());
        self.inputs.lock().unwrap().push(input.clone());
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            return Ok(PlannerOutput::completed("[no more scripts]"));
        }
        Ok(scripts.remove(0))
    }
}

/// Planner that fails `fail_times` calls before succeeding with a fixed
/// completion.  Used to exercise the transport retry/backoff path.
pub struct FailingPlanner {
    remaining_failures: Arc<Mutex<u32>>,
    pub calls: Arc<Mutex<u32>>,
}

impl FailingPlanner {
    pub fn new(fail_times: u32) -> Self {
        Self {
            remaining_failures: Arc::new(Mutex::new(fail_times)),
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl PlannerProvider for FailingPlanner {
    fn name(&self) -> &str {
        "failing-mock"
    }

    async fn plan(&self, _input: &PlannerInput) -> anyhow::Result<PlannerOutput> {
        *self.calls.lock().unwrap() += 1;
        let mut left = self.remaining_failures.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            anyhow::bail!("simulated transport failure");
        }
        Ok(PlannerOutput::completed("recovered"))
    }
}

/// Validator returning a fixed verdict for every request.
pub struct StaticValidator {
    verdict: SufficiencyVerdict,
}

impl StaticValidator {
    pub fn sufficient() -> Self {
        Self {
            verdict: SufficiencyVerdict::sufficient(),
        }
    }

    pub fn insufficient(explanation: impl Into<String>) -> Self {
        Self {
            verdict: SufficiencyVerdict::insufficient(explanation),
        }
    }

    pub fn with_verdict(verdict: SufficiencyVerdict) -> Self {
        Self { verdict }
    }
}

#[async_trait]
impl SufficiencyValidator for StaticValidator {
    async fn validate(&self, _request: &SufficiencyRequest) -> anyhow::Result<SufficiencyVerdict> {
        Ok(self.verdict.clone())
    }
}

/// Validator popping pre-scripted verdicts; records every request.
pub struct ScriptedValidator {
    verdicts: Arc<Mutex<Vec<SufficiencyVerdict>>>,
    pub requests: Arc<Mutex<Vec<SufficiencyRequest>>>,
}

impl ScriptedValidator {
    pub fn new(verdicts: Vec<SufficiencyVerdict>) -> Self {
        Self {
            verdicts: Arc::new(Mutex::new(verdicts)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl SufficiencyValidator for ScriptedValidator {
    async fn validate(&self, request: &SufficiencyRequest) -> anyhow::Result<SufficiencyVerdict> {
        self.requests.lock().unwrap().push(request.clone());
        let mut verdicts = self.verdicts.lock().unwrap();
        if verdicts.is_empty() {
            return Ok(SufficiencyVerdict::sufficient());
        }
        Ok(verdicts.remove(0))
    }
}

/// Extractor that returns the raw content untouched.  Stands in for the
/// cheap model in tests and offline runs.
#[derive(Default)]
pub struct PassthroughExtractor;

#[async_trait]
impl ContentExtractor for PassthroughExtractor {
    async fn extract(&self, _prompt: &str, content: &str) -> anyhow::Result<String> {
        Ok(content.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::{CommandRules, ExecuteTool};

    fn input(msg: &str) -> PlannerInput {
        PlannerInput {
            latest_message: msg.into(),
            available_tools: vec![],
            context: vec![],
            custom_instructions: None,
            config: CommandRules::default(),
            cached_files: vec![],
            tool_results: vec![],
        }
    }

    #[tokio::test]
    async fn completing_planner_echoes_message() {
        let p = CompletingPlanner;
        let out = p.plan(&input("hello")).await.unwrap();
        assert!(out.task_completed);
        assert!(out.explanation.contains("MOCK: hello"));
    }

    #[tokio::test]
    async fn scripted_planner_pops_in_order() {
        let p = ScriptedPlanner::new(vec![
            PlannerOutput::calls(
                "step 1",
                vec![ExecuteTool {
                    tool_name: "grep".into(),
                    tool_input: json!({"pattern": "x"}),
                }],
            ),
            PlannerOutput::completed("done"),
        ]);
        let first = p.plan(&input("go")).await.unwrap();
        assert!(!first.task_completed);
        let second = p.plan(&input("go")).await.unwrap();
        assert!(second.task_completed);
        assert_eq!(p.remaining(), 0);
    }

    #[tokio::test]
    async fn scripted_planner_records_inputs() {
        let p = ScriptedPlanner::new(vec![PlannerOutput::completed("ok")]);
        p.plan(&input("first")).await.unwrap();
        let last = p.last_input.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().latest_message, "first");
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let p = ScriptedPlanner::new(vec![]);
        let out = p.plan(&input("x")).await.unwrap();
        assert!(out.task_completed);
        assert!(out.explanation.contains("no more scripts"));
    }

    #[tokio::test]
    async fn failing_planner_recovers_after_failures() {
        let p = FailingPlanner::new(2);
        assert!(p.plan(&input("a")).await.is_err());
        assert!(p.plan(&input("a")).await.is_err());
        let out = p.plan(&input("a")).await.unwrap();
        assert!(out.task_completed);
        assert_eq!(*p.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn static_validator_returns_fixed_verdict() {
        let v = StaticValidator::insufficient("must read file first");
        let req = SufficiencyRequest {
            file_path: "a.rs".into(),
            cache_kind: crate::protocol::CacheKind::Full,
            old_string: "x".into(),
            new_string: "y".into(),
            content: String::new(),
        };
        let verdict = v.validate(&req).await.unwrap();
        assert!(!verdict.is_sufficient);
        assert!(verdict.explanation.contains("must read"));
    }

    #[tokio::test]
    async fn passthrough_extractor_returns_content() {
        let e = PassthroughExtractor;
        let out = e.extract("summarize", "body text").await.unwrap();
        assert_eq!(out, "body text");
    }
}
