// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use odin_config::AgentMode;
use odin_planner::LineRange;

/// A single tool invocation requested by the planner.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier assigned by the driver (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// Typed failure taxonomy for tool execution.  Every variant is non-fatal
/// at the loop level: it is embedded in the next planner input as an error
/// result so the planner can adjust strategy.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Input schema violation or constraint failure
    #[error("invalid input: {0}")]
    Validation(String),
    /// Edit pre-hook rejected: the cache does not carry enough context
    #[error("cache insufficient: {explanation}")]
    CacheInsufficient {
        explanation: String,
        suggested_ranges: Vec<LineRange>,
    },
    /// `old_string` absent in the current on-disk content
    #[error("target not found: {0}")]
    TargetNotFound(String),
    /// Path outside the workspace without approval, or a forbidden command
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Shell command completed with a non-zero exit code
    #[error("[exit {exit_code}]\n{output}")]
    CommandFailed { exit_code: i32, output: String },
    /// mtime or content-hash drift detected on a cached file
    #[error("external modification detected: {0}")]
    ExternalModification(String),
    #[error("timeout after {secs}s")]
    Timeout { secs: u64 },
    /// Network failure talking to an external service
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Internal consistency violation
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ToolError {
    /// Stable machine-readable tag used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation(_) => "tool_validation",
            ToolError::CacheInsufficient { .. } => "cache_insufficient",
            ToolError::TargetNotFound(_) => "target_not_found",
            ToolError::PermissionDenied(_) => "permission_denied",
            ToolError::CommandFailed { .. } => "command_failed",
            ToolError::ExternalModification(_) => "external_modification",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Transport(_) => "transport",
            ToolError::Io(_) => "io",
            ToolError::Invariant(_) => "invariant",
        }
    }
}

/// The structured result of a completed tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolResponse {
    pub data: Map<String, Value>,
    /// One-line summary appended to the message tool history
    pub description: String,
    /// Files this call created or rewrote
    pub affected_files: Vec<PathBuf>,
}

impl ToolResponse {
    pub fn new(data: Value, description: impl Into<String>) -> Self {
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                map
            }
        };
        Self {
            data,
            description: description.into(),
            affected_files: Vec::new(),
        }
    }

    pub fn with_affected_files(mut self, files: Vec<PathBuf>) -> Self {
        self.affected_files = files;
        self
    }
}

/// Final outcome of one dispatched call, success or failure, as consumed by
/// the planner driver.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub tool_name: String,
    pub data: Value,
    pub description: String,
    pub affected_files: Vec<PathBuf>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, tool_name: impl Into<String>, response: ToolResponse) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            data: Value::Object(response.data),
            description: response.description,
            affected_files: response.affected_files,
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, tool_name: impl Into<String>, error: &ToolError) -> Self {
        let mut data = Map::new();
        data.insert("error".into(), Value::String(error.kind().into()));
        data.insert("message".into(), Value::String(error.to_string()));
        if let ToolError::CacheInsufficient { suggested_ranges, .. } = error {
            data.insert(
                "suggested_line_ranges".into(),
                serde_json::to_value(suggested_ranges).unwrap_or(Value::Null),
            );
        }
        if let ToolError::CommandFailed { exit_code, .. } = error {
            data.insert("exit_code".into(), Value::from(*exit_code));
        }
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            data: Value::Object(data),
            description: error.to_string(),
            affected_files: Vec::new(),
            is_error: true,
        }
    }
}

/// Trait every tool implements.  The runtime calls the triple in order —
/// `pre_hook`, `execute`, `post_hook` — and propagates the first failure
/// without invoking later stages.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema (draft-07) for parameters
    fn parameters_schema(&self) -> Value;
    /// The agent modes in which this tool is available.
    /// Default: all modes (Ask, Plan, Edit).
    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Ask, AgentMode::Plan, AgentMode::Edit]
    }
    /// True when this call mutates the workspace; such calls are never
    /// dispatched in parallel with another call touching the same path.
    fn is_mutating(&self, _args: &Value) -> bool {
        false
    }
    /// Paths this call touches, used for collision serialization.
    fn target_paths(&self, _args: &Value) -> Vec<PathBuf> {
        Vec::new()
    }
    /// Validate and prepare the input.  The returned value is handed to
    /// `execute` unchanged.
    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        Ok(call.args.clone())
    }
    /// Perform the work and return the raw result.
    async fn execute(&self, call: &ToolCall, prepared: Value) -> Result<Value, ToolError>;
    /// Shape the raw result into the structured response; side effects such
    /// as cache updates belong here.
    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        Ok(ToolResponse::new(raw, String::new()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
