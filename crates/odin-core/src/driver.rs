// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use odin_config::AgentMode;
use odin_planner::{
    CommandRules, PlannerInput, PlannerOutput, ToolResultRecord,
};
use odin_tools::{TodoItem, ToolCall, ToolEvent, ToolRegistry};

use crate::agent::CoreDeps;
use crate::message::ToolHistoryEntry;
use crate::state::SharedState;

/// Fatal loop failures.  Tool-level errors never reach this type — they
/// are embedded in the next planner input instead.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("iteration limit of {0} reached")]
    IterationLimit(u32),
    #[error("planner unreachable after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },
    #[error("planner returned no tool calls without completing the task")]
    EmptyPlan,
    #[error("activation cancelled")]
    Cancelled,
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Drives one message through the plan-act loop: assemble planner input,
/// invoke the planner, dispatch the returned tool calls, repeat until the
/// planner declares completion.
pub struct PlannerDriver {
    deps: CoreDeps,
    state: Arc<SharedState>,
    registry: Arc<ToolRegistry>,
    todos: Arc<Mutex<Vec<TodoItem>>>,
    tool_events: mpsc::Receiver<ToolEvent>,
}

impl PlannerDriver {
    pub fn new(
        deps: CoreDeps,
        state: Arc<SharedState>,
        registry: Arc<ToolRegistry>,
        todos: Arc<Mutex<Vec<TodoItem>>>,
        tool_events: mpsc::Receiver<ToolEvent>,
    ) -> Self {
        Self {
            deps,
            state,
            registry,
            todos,
            tool_events,
        }
    }

    /// Run the loop for the message at `index`.  Returns the planner's
    /// final explanation.  `cancel` is checked between iterations so a
    /// killed agent exits gracefully after the current tool batch.
    pub async fn run(
        &mut self,
        index: usize,
        mode: AgentMode,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<String, LoopError> {
        let max_iterations = self.deps.config.agent.max_iterations;
        let mut tool_results: Vec<ToolResultRecord> = Vec::new();
        let mut iteration: u32 = 0;

        loop {
            if let Some(flag) = &cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(LoopError::Cancelled);
                }
            }

            iteration += 1;
            if max_iterations > 0 && iteration > max_iterations {
                return Err(LoopError::IterationLimit(max_iterations));
            }

            let input = self.build_input(index, mode, &tool_results)?;
            let output = self.plan_with_retry(&input).await?;
            debug!(
                iteration,
                completed = output.task_completed,
                "planner responded"
            );

            if output.task_completed {
                // Any tool field on a terminal response is ignored.
                return Ok(output.explanation);
            }

            let calls = self.to_tool_calls(&output, iteration)?;
            let outcome = Arc::clone(&self.registry).execute_batch(mode, calls).await;

            // History lands in completion order, which may differ from
            // issue order.
            for &slot in &outcome.completion_order {
                let out = &outcome.outputs[slot];
                self.state.append_tool_history(
                    index,
                    ToolHistoryEntry {
                        tool_name: out.tool_name.clone(),
                        affected_files: out.affected_files.clone(),
                        description: out.description.clone(),
                    },
                );
                self.state.push_update(index, out.description.clone());
            }

            self.drain_tool_events(index).await;
            self.state.publisher().publish(crate::events::StateEvent::CacheChanged);

            // Results go back to the planner in issue order.
            tool_results = outcome
                .outputs
                .iter()
                .map(|out| ToolResultRecord {
                    tool_name: out.tool_name.clone(),
                    output: out.data.clone(),
                    is_error: out.is_error,
                    description: out.description.clone(),
                })
                .collect();
        }
    }

    fn build_input(
        &self,
        index: usize,
        mode: AgentMode,
        tool_results: &[ToolResultRecord],
    ) -> Result<PlannerInput, LoopError> {
        let latest_message = self
            .state
            .message_body(index)
            .ok_or_else(|| LoopError::Invariant(format!("message {index} vanished")))?;
        Ok(PlannerInput {
            latest_message,
            available_tools: self.registry.schemas_for_mode(mode),
            context: self.state.context_items(),
            custom_instructions: self.state.custom_instructions.clone(),
            config: CommandRules {
                allowed_commands: self.deps.config.allowed_commands.clone(),
                forbidden_commands: self.deps.config.forbidden_commands.clone(),
            },
            cached_files: self.state.cache.snapshot_infos(),
            tool_results: tool_results.to_vec(),
        })
    }

    /// Call the planner with bounded exponential backoff.  Transport
    /// failures escalate to a fatal loop error once retries are exhausted.
    async fn plan_with_retry(&self, input: &PlannerInput) -> Result<PlannerOutput, LoopError> {
        let attempts = self.deps.config.agent.transport_retries.max(1);
        let base_delay = self.deps.config.agent.retry_base_delay_ms;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let exponent = (attempt - 1).min(16);
                let delay = base_delay.saturating_mul(1u64 << exponent);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            match self.deps.planner.plan(input).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "planner call failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(LoopError::Transport {
            attempts,
            message: last_error,
        })
    }

    fn to_tool_calls(
        &self,
        output: &PlannerOutput,
        iteration: u32,
    ) -> Result<Vec<ToolCall>, LoopError> {
        let calls = output.tool_calls();
        if calls.is_empty() {
            return Err(LoopError::EmptyPlan);
        }
        Ok(calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: format!("call-{iteration}-{i}"),
                name: call.tool_name,
                args: call.tool_input,
            })
            .collect())
    }

    /// Apply pending tool events to the owning message.
    async fn drain_tool_events(&mut self, index: usize) {
        while let Ok(event) = self.tool_events.try_recv() {
            match event {
                ToolEvent::TodoUpdate(todos) => {
                    self.state.set_todos(index, todos);
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
