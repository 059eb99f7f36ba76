// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use odin_tools::{
    CommandPolicy, ContextSummarizerTool, EditTool, ExecuteCommandTool, GlobTool, GrepTool,
    InitTool, LsTool, MultiEditTool, Safeguard, TodoItem, TodoWriteTool, ToolEvent, ToolRegistry,
    WebFetchTool, WriteFileTool,
};

use crate::agent::CoreDeps;
use crate::agent_tool::AgentTool;
use crate::state::SharedState;

/// A registry wired to one agent's state, plus the channels the driver
/// drains: the shared todo list and the tool event stream.
pub struct AgentToolset {
    pub registry: Arc<ToolRegistry>,
    pub todos: Arc<Mutex<Vec<TodoItem>>>,
    pub tool_events: mpsc::Receiver<ToolEvent>,
}

/// Build the tool registry for an agent.  Mode gating happens through each
/// tool's `modes()`; `include_agent_tool` is false for subagents so the
/// catalog can never recurse.
pub fn build_toolset(
    deps: &CoreDeps,
    state: &Arc<SharedState>,
    include_agent_tool: bool,
) -> AgentToolset {
    let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel::<ToolEvent>(64);

    let safeguard = Arc::new(Safeguard::new(
        deps.workspace_root.clone(),
        CommandPolicy::from_config(&deps.config),
        Arc::clone(&deps.gate),
    ));
    let cache = Arc::clone(&state.cache);

    let mut registry = ToolRegistry::new(&deps.config.tools);
    registry.register(TodoWriteTool::new(Arc::clone(&todos), tx));
    registry.register(LsTool::new(Arc::clone(&cache)));
    registry.register(GrepTool::new(
        Arc::clone(&cache),
        deps.workspace_root.clone(),
    ));
    registry.register(GlobTool::new(
        Arc::clone(&cache),
        deps.workspace_root.clone(),
    ));
    registry.register(WebFetchTool::new(
        Arc::clone(&deps.extractor),
        deps.config.tools.fetch_max_chars,
    ));
    registry.register(ContextSummarizerTool::new(Arc::clone(&state.context)));
    registry.register(ExecuteCommandTool::new(
        Arc::clone(&safeguard),
        deps.config.tools.timeout_secs,
    ));
    registry.register(WriteFileTool::new(
        Arc::clone(&cache),
        Arc::clone(&safeguard),
    ));
    registry.register(EditTool::new(
        Arc::clone(&cache),
        Arc::clone(&safeguard),
        Arc::clone(&deps.validator),
    ));
    registry.register(MultiEditTool::new(
        Arc::clone(&cache),
        Arc::clone(&safeguard),
        Arc::clone(&deps.validator),
    ));
    registry.register(InitTool::new(
        Arc::clone(&cache),
        deps.workspace_root.clone(),
    ));
    // Subagents never receive the agent tool.
    if include_agent_tool {
        registry.register(AgentTool::new(deps.clone(), Arc::downgrade(state)));
    }

    AgentToolset {
        registry: Arc::new(registry),
        todos,
        tool_events: rx,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
