// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use odin_config::AgentMode;
use odin_tools::TodoItem;

/// One completed tool call as recorded on the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    pub tool_name: String,
    pub affected_files: Vec<PathBuf>,
    pub description: String,
}

/// A user request and everything accumulated while processing it.  The
/// body is immutable; the remaining fields are filled in by the executor
/// that owns the message for the duration of its plan-act loop.  Messages
/// are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub body: String,
    pub answer_summary: Option<String>,
    pub todos: Vec<TodoItem>,
    pub tool_history: Vec<ToolHistoryEntry>,
    /// Transient progress strings; reset to an empty list (never absent)
    /// when execution finishes.
    pub updates: Vec<String>,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            answer_summary: None,
            todos: Vec::new(),
            tool_history: Vec::new(),
            updates: Vec::new(),
        }
    }
}

/// A request admitted while another activation was running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub body: String,
    pub mode: AgentMode,
    pub timestamp: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(body: impl Into<String>, mode: AgentMode) -> Self {
        Self {
            body: body.into(),
            mode,
            timestamp: Utc::now(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
