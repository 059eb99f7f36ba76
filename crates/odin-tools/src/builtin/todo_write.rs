// SPDX-License-Identifier: MIT
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::events::{TodoItem, TodoStatus, ToolEvent};
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Overwrites the current message's todo list.  The shared list and the
/// event channel are owned by the driver, which mirrors updates into the
/// message under the messages lock.
pub struct TodoWriteTool {
    todos: Arc<Mutex<Vec<TodoItem>>>,
    event_tx: mpsc::Sender<ToolEvent>,
}

impl TodoWriteTool {
    pub fn new(todos: Arc<Mutex<Vec<TodoItem>>>, event_tx: mpsc::Sender<ToolEvent>) -> Self {
        Self { todos, event_tx }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Create and manage a structured task list for the current message.\n\
         Statuses: pending | in_progress | completed. Only ONE item may be \
         in_progress at a time, and a completed item never goes back.\n\
         Calling todo_write replaces the entire list (not a merge/patch).\n\
         Each item requires a unique id and non-empty content. \
         Mark items complete immediately after finishing them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "Array of todo items to set (replaces existing list)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {
                                "type": "string",
                                "description": "Unique identifier for the task"
                            },
                            "content": {
                                "type": "string",
                                "description": "Description of the task"
                            },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"],
                                "description": "Current status of the task"
                            }
                        },
                        "required": ["id", "content", "status"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let items = parse_todos(&call.args)?;

        let mut seen: HashSet<&str> = HashSet::new();
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                return Err(ToolError::Validation(format!(
                    "duplicate todo id '{}'",
                    item.id
                )));
            }
            if item.content.trim().is_empty() {
                return Err(ToolError::Validation(format!(
                    "todo '{}' has empty content",
                    item.id
                )));
            }
        }

        let in_progress = items
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        if in_progress > 1 {
            return Err(ToolError::Validation(
                "at most one todo can be in_progress at a time".into(),
            ));
        }

        // A completed todo never reverts.
        let current = self.todos.lock().await;
        for prior in current.iter().filter(|t| t.status == TodoStatus::Completed) {
            if let Some(new) = items.iter().find(|t| t.id == prior.id) {
                if new.status != TodoStatus::Completed {
                    return Err(ToolError::Validation(format!(
                        "todo '{}' is completed and cannot revert to {}",
                        prior.id, new.status
                    )));
                }
            }
        }

        Ok(serde_json::to_value(items).unwrap_or(Value::Null))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let items: Vec<TodoItem> = serde_json::from_value(prepared)
            .map_err(|e| ToolError::Invariant(format!("prepared todos unreadable: {e}")))?;
        debug!(count = items.len(), "todo_write tool");
        *self.todos.lock().await = items.clone();
        let _ = self
            .event_tx
            .send(ToolEvent::TodoUpdate(items.clone()))
            .await;
        Ok(serde_json::to_value(items).unwrap_or(Value::Null))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let count = raw.as_array().map(|a| a.len()).unwrap_or(0);
        Ok(ToolResponse::new(
            json!({ "todos": raw }),
            format!("updated todo list ({count} items)"),
        ))
    }
}

/// Parse and normalize the raw todo array.  Ids may arrive as strings or
/// unsigned integers; integers are normalized to decimal strings.
fn parse_todos(args: &Value) -> Result<Vec<TodoItem>, ToolError> {
    let raw = args
        .get("todos")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::Validation("missing 'todos' array".into()))?;

    let mut items = Vec::with_capacity(raw.len());
    for item in raw {
        let id = match item.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if n.as_u64().is_some() => n.to_string(),
            Some(other) => {
                return Err(ToolError::Validation(format!(
                    "todo id must be a string or unsigned integer, got {other}"
                )))
            }
            None => return Err(ToolError::Validation("todo item missing 'id'".into())),
        };
        let content = item
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation(format!("todo '{id}' missing 'content'")))?
            .to_string();
        let status = match item.get("status").and_then(|v| v.as_str()) {
            Some("pending") => TodoStatus::Pending,
            Some("in_progress") => TodoStatus::InProgress,
            Some("completed") => TodoStatus::Completed,
            Some(other) => {
                return Err(ToolError::Validation(format!(
                    "invalid status '{other}' for todo '{id}'"
                )))
            }
            None => return Err(ToolError::Validation(format!("todo '{id}' missing 'status'"))),
        };
        items.push(TodoItem {
            id,
            content,
            status,
        });
    }
    Ok(items)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
