// SPDX-License-Identifier: MIT
use std::sync::Weak;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_config::AgentMode;
use odin_tools::{Tool, ToolCall, ToolError, ToolResponse};

use crate::agent::{CoreDeps, SubAgent};
use crate::driver::LoopError;
use crate::state::SharedState;

/// Spawns a subagent bound to a mode and returns its answer summary.
/// Registered only on main-agent registries; subagent catalogs omit it, so
/// delegation never recurses.
pub struct AgentTool {
    deps: CoreDeps,
    parent: Weak<SharedState>,
}

impl AgentTool {
    pub fn new(deps: CoreDeps, parent: Weak<SharedState>) -> Self {
        Self { deps, parent }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        "agent"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to complete a focused task and return its final \
         answer. Useful for delegating isolated sub-tasks. The subagent \
         runs its own plan-act loop with its own state, inherits the \
         current context read-only, and cannot spawn further subagents. \
         mode selects its tool authorization (default ask)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task description for the subagent"
                },
                "mode": {
                    "type": "string",
                    "enum": ["ask", "plan", "edit"],
                    "description": "Operating mode for the subagent (default ask)"
                }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let prompt = call
            .args
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'prompt'".into()))?;
        if prompt.trim().is_empty() {
            return Err(ToolError::Validation("'prompt' must not be empty".into()));
        }
        let mode = match call.args.get("mode").and_then(|v| v.as_str()) {
            None | Some("ask") => AgentMode::Ask,
            Some("plan") => AgentMode::Plan,
            Some("edit") => AgentMode::Edit,
            Some(other) => {
                return Err(ToolError::Validation(format!("unknown mode '{other}'")))
            }
        };
        Ok(json!({ "prompt": prompt, "mode": mode.to_string() }))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let prompt = prepared["prompt"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'prompt'".into()))?;
        let mode = match prepared["mode"].as_str() {
            Some("plan") => AgentMode::Plan,
            Some("edit") => AgentMode::Edit,
            _ => AgentMode::Ask,
        };

        let parent = self
            .parent
            .upgrade()
            .ok_or_else(|| ToolError::Invariant("parent state dropped".into()))?;

        debug!(mode = %mode, "agent tool spawning subagent");
        let sub = SubAgent::new(self.deps.clone(), mode, &parent);
        let id = sub.id().to_string();

        let summary = sub.execute(prompt).await.map_err(|e| match e {
            LoopError::Transport { attempts, message } => {
                ToolError::Transport(format!("subagent planner ({attempts} attempts): {message}"))
            }
            other => ToolError::Invariant(format!("subagent failed: {other}")),
        })?;

        Ok(json!({
            "subagent_id": id,
            "mode": mode.to_string(),
            "summary": summary,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let mode = raw["mode"].as_str().unwrap_or("?").to_string();
        Ok(ToolResponse::new(raw, format!("subagent ({mode}) completed")))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use odin_config::Config;
    use odin_planner::{CompletingPlanner, PassthroughExtractor, StaticValidator};
    use odin_tools::DenyAll;
    use serde_json::json;

    use super::*;

    fn deps(root: &std::path::Path) -> CoreDeps {
        CoreDeps {
            config: Arc::new(Config::default()),
            workspace_root: root.to_path_buf(),
            planner: Arc::new(CompletingPlanner),
            validator: Arc::new(StaticValidator::sufficient()),
            extractor: Arc::new(PassthroughExtractor),
            gate: Arc::new(DenyAll),
        }
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "a1".into(),
            name: "agent".into(),
            args,
        }
    }

    #[tokio::test]
    async fn spawns_subagent_and_returns_summary() {
        let dir = tempfile::tempdir().unwrap();
        let d = deps(dir.path());
        let parent = SharedState::new(Arc::clone(&d.config), None);
        let tool = AgentTool::new(d, Arc::downgrade(&parent));

        let c = call(json!({"prompt": "summarize the repo", "mode": "plan"}));
        let prepared = tool.pre_hook(&c).await.unwrap();
        let raw = tool.execute(&c, prepared).await.unwrap();
        let resp = tool.post_hook(&c, raw).await.unwrap();

        assert!(resp.data["summary"]
            .as_str()
            .unwrap()
            .contains("summarize the repo"));
        assert!(resp.description.contains("plan"));
        assert_eq!(parent.sub_agent_count(), 0, "subagent removed after run");
    }

    #[tokio::test]
    async fn missing_prompt_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let d = deps(dir.path());
        let parent = SharedState::new(Arc::clone(&d.config), None);
        let tool = AgentTool::new(d, Arc::downgrade(&parent));
        let err = tool.pre_hook(&call(json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let d = deps(dir.path());
        let parent = SharedState::new(Arc::clone(&d.config), None);
        let tool = AgentTool::new(d, Arc::downgrade(&parent));
        let err = tool
            .pre_hook(&call(json!({"prompt": "x", "mode": "yolo"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn dropped_parent_is_invariant_error() {
        let dir = tempfile::tempdir().unwrap();
        let d = deps(dir.path());
        let parent = SharedState::new(Arc::clone(&d.config), None);
        let tool = AgentTool::new(d, Arc::downgrade(&parent));
        drop(parent);
        let c = call(json!({"prompt": "x"}));
        let prepared = tool.pre_hook(&c).await.unwrap();
        let err = tool.execute(&c, prepared).await.unwrap_err();
        assert!(matches!(err, ToolError::Invariant(_)));
    }
}
