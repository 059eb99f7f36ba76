// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tracing::debug;

use odin_config::{AgentMode, Config};
use odin_planner::{ContentExtractor, PlannerProvider, SufficiencyValidator};
use odin_tools::ApprovalGate;

use crate::driver::{LoopError, PlannerDriver};
use crate::events::StateEvent;
use crate::executor::Executor;
use crate::state::{Admission, SharedState, SubAgentHandle};
use crate::toolset::build_toolset;

/// The external collaborators every agent needs: configuration, the
/// planner and assist models, and the approval gate.  Cheap to clone.
#[derive(Clone)]
pub struct CoreDeps {
    pub config: Arc<Config>,
    pub workspace_root: PathBuf,
    pub planner: Arc<dyn PlannerProvider>,
    pub validator: Arc<dyn SufficiencyValidator>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub gate: Arc<dyn ApprovalGate>,
}

/// The main agent: owns the process-wide shared state for its lifetime and
/// feeds incoming messages to the executor.
pub struct MainAgent {
    state: Arc<SharedState>,
    executor: Executor,
}

impl MainAgent {
    pub fn new(deps: CoreDeps) -> Self {
        let instructions = odin_config::load_custom_instructions(&deps.workspace_root);
        let state = SharedState::new(Arc::clone(&deps.config), instructions);
        let executor = Executor::new(Arc::clone(&state), deps);
        Self { state, executor }
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.state.publisher().subscribe()
    }

    /// Submit a message.  Runs immediately when idle, otherwise joins the
    /// FIFO queue behind the current activation.
    pub fn execute(&self, body: impl Into<String>, mode: AgentMode) -> Admission {
        self.executor.handle_incoming(body.into(), mode)
    }

    /// Submit a message and wait for its answer.  Intended for serial
    /// callers (the CLI REPL); answers arrive in submission order.
    pub async fn execute_and_wait(&self, body: impl Into<String>, mode: AgentMode) -> String {
        let mut rx = self.subscribe();
        self.execute(body, mode);
        loop {
            match rx.recv().await {
                Ok(StateEvent::AnswerReady { summary, .. }) => return summary,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return String::new(),
            }
        }
    }

    /// Mark the running plan-act loop and every live subagent for graceful
    /// exit.  In-flight tool calls complete first.
    pub fn kill(&self) {
        self.executor.kill();
        self.state.kill_sub_agents();
    }
}

/// A child agent with its own state and one plan-act loop.  It keeps only
/// a weak back-reference to the parent state — enough to inherit context
/// read-only at spawn and to deregister on exit, never enough to keep the
/// parent alive.
pub struct SubAgent {
    id: String,
    mode: AgentMode,
    deps: CoreDeps,
    state: Arc<SharedState>,
    parent: Weak<SharedState>,
    cancel: Arc<AtomicBool>,
}

impl SubAgent {
    pub fn new(deps: CoreDeps, mode: AgentMode, parent: &Arc<SharedState>) -> Self {
        let id = format!("sub-{}", uuid::Uuid::new_v4());
        let state = SharedState::new(Arc::clone(&deps.config), parent.custom_instructions.clone());
        // Read-only context inheritance: snapshot the parent's context at
        // spawn time.
        for item in parent.context_items() {
            state.push_context(item);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        parent.register_sub_agent(SubAgentHandle::new(id.clone(), mode, Arc::clone(&cancel)));
        debug!(id = %id, mode = %mode, "subagent spawned");
        Self {
            id,
            mode,
            deps,
            state,
            parent: Arc::downgrade(parent),
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Mark the loop for graceful exit after the current tool completes.
    pub fn kill(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Run one plan-act loop against the subagent's own state and return
    /// the answer summary.  The subagent removes itself from the parent's
    /// registry on the way out, success or failure.
    pub async fn execute(&self, body: &str) -> Result<String, LoopError> {
        let admission = self.state.admit(body.to_string(), self.mode);
        debug_assert!(matches!(admission, Admission::Started(_)));

        let index = self.state.push_message(body.to_string());
        self.state.publisher().publish(StateEvent::MessageStarted {
            index,
            mode: self.mode,
        });

        // The catalog excludes the agent tool: subagents never spawn
        // further subagents.
        let toolset = build_toolset(&self.deps, &self.state, false);
        let mut driver = PlannerDriver::new(
            self.deps.clone(),
            Arc::clone(&self.state),
            toolset.registry,
            toolset.todos,
            toolset.tool_events,
        );

        let result = driver
            .run(index, self.mode, Some(Arc::clone(&self.cancel)))
            .await;

        match &result {
            Ok(summary) => self.state.complete_message(index, summary.clone()),
            Err(e) => self
                .state
                .complete_message(index, format!("subagent failed: {e}")),
        }
        self.state.finish_and_pop();

        if let Some(parent) = self.parent.upgrade() {
            parent.remove_sub_agent(&self.id);
        }
        debug!(id = %self.id, ok = result.is_ok(), "subagent finished");
        result
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
