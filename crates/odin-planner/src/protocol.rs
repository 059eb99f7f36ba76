// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema for one tool as advertised to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema (draft-07) for the tool input
    pub input_schema: Value,
}

/// A piece of retrieved context surfaced to the planner alongside the
/// message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_command: Option<String>,
}

impl ContextItem {
    pub fn from_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            file_path: Some(path.into()),
            source_command: None,
        }
    }
}

/// Read-time snapshot of one cache entry, exposed so the planner knows what
/// is already in memory before issuing redundant reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFileInfo {
    pub path: String,
    pub size: u64,
    pub is_modified: bool,
    pub cached_at: DateTime<Utc>,
    /// True when the file exceeded the cache's per-file size limit and only
    /// metadata was retained.
    pub is_truncated: bool,
}

/// Outcome of one tool call from the previous iteration, embedded in the
/// next planner input so the planner can adjust strategy after errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool_name: String,
    pub output: Value,
    pub is_error: bool,
    pub description: String,
}

/// The command-policy slice of the config, forwarded verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRules {
    pub allowed_commands: Vec<String>,
    pub forbidden_commands: Vec<String>,
}

/// Everything the planner sees for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerInput {
    pub latest_message: String,
    pub available_tools: Vec<ToolDescriptor>,
    pub context: Vec<ContextItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    pub config: CommandRules,
    pub cached_files: Vec<CachedFileInfo>,
    /// Results of the tool calls dispatched in the previous iteration,
    /// in the order they were issued.
    pub tool_results: Vec<ToolResultRecord>,
}

/// One tool invocation requested by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTool {
    pub tool_name: String,
    pub tool_input: Value,
}

/// Wire shape: `executeTool` may be a single object or an array; some
/// planner builds emit `executeTools` for the array form.  Both normalize
/// to a list via [`PlannerOutput::tool_calls`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(ExecuteTool),
    Many(Vec<ExecuteTool>),
}

/// Planner response for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerOutput {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub task_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_tool: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_tools: Option<Vec<ExecuteTool>>,
}

impl PlannerOutput {
    /// Terminal response carrying the final answer.
    pub fn completed(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            task_completed: true,
            execute_tool: None,
            execute_tools: None,
        }
    }

    /// Non-terminal response requesting a batch of tool calls.
    pub fn calls(explanation: impl Into<String>, calls: Vec<ExecuteTool>) -> Self {
        Self {
            explanation: explanation.into(),
            task_completed: false,
            execute_tool: Some(OneOrMany::Many(calls)),
            execute_tools: None,
        }
    }

    /// Normalize the scalar-or-list wire shapes into one list.
    pub fn tool_calls(&self) -> Vec<ExecuteTool> {
        let mut out = Vec::new();
        match &self.execute_tool {
            Some(OneOrMany::One(t)) => out.push(t.clone()),
            Some(OneOrMany::Many(ts)) => out.extend(ts.iter().cloned()),
            None => {}
        }
        if let Some(ts) = &self.execute_tools {
            out.extend(ts.iter().cloned());
        }
        out
    }
}

// ── Cache sufficiency protocol ────────────────────────────────────────────────

/// What kind of cache entry backs the gathered content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Full,
    /// Segment keys (`"start-end"`) present for the file.
    Partial(Vec<String>),
}

/// Request sent to the cache-sufficiency validator model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SufficiencyRequest {
    pub file_path: String,
    pub cache_kind: CacheKind,
    pub old_string: String,
    pub new_string: String,
    /// Full content or concatenated segments with line-range headers.
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRange {
    pub start_line: u32,
    pub end_line: u32,
    pub reason: String,
}

/// Verdict returned by the validator.  Advisory only — the cache never
/// rewrites files itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    pub is_sufficient: bool,
    pub explanation: String,
    #[serde(default)]
    pub suggested_line_ranges: Vec<LineRange>,
}

impl SufficiencyVerdict {
    pub fn insufficient(explanation: impl Into<String>) -> Self {
        Self {
            is_sufficient: false,
            explanation: explanation.into(),
            suggested_line_ranges: Vec::new(),
        }
    }

    pub fn sufficient() -> Self {
        Self {
            is_sufficient: true,
            explanation: String::new(),
            suggested_line_ranges: Vec::new(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
