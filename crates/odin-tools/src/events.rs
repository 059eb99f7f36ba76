// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Status of one todo item.  A completed item never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoStatus::Pending => write!(f, "pending"),
            TodoStatus::InProgress => write!(f, "in_progress"),
            TodoStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A structured todo item managed by the todo_write tool.
/// Ids are strings on the wire; numeric ids are normalized to their decimal
/// representation at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// Events emitted by tools to communicate state changes back to the driver.
/// The driver translates these into message-state updates and publishes
/// them to state subscribers.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    TodoUpdate(Vec<TodoItem>),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serde_is_snake_case() {
        let s = serde_json::to_string(&TodoStatus::InProgress).unwrap();
        assert_eq!(s, "\"in_progress\"");
        let back: TodoStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(back, TodoStatus::Completed);
    }

    #[test]
    fn todo_item_round_trips() {
        let item = TodoItem {
            id: "1".into(),
            content: "analyze codebase".into(),
            status: TodoStatus::Pending,
        };
        let s = serde_json::to_string(&item).unwrap();
        let back: TodoItem = serde_json::from_str(&s).unwrap();
        assert_eq!(back, item);
    }
}
