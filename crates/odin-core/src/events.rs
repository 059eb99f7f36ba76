// SPDX-License-Identifier: MIT
use tokio::sync::broadcast;

use odin_config::AgentMode;
use odin_tools::TodoItem;

use crate::message::ToolHistoryEntry;

/// State snapshot change notifications.  Emitted whenever messages, todos,
/// tool history, or cache composition change; consumers (UI transports)
/// subscribe and render.
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// A message was queued behind a running activation
    MessageQueued { position: usize },
    /// An activation picked up a message
    MessageStarted { index: usize, mode: AgentMode },
    /// The todo list of a message was replaced
    TodoUpdate { index: usize, todos: Vec<TodoItem> },
    /// A tool call finished and was recorded
    ToolHistoryAppended {
        index: usize,
        entry: ToolHistoryEntry,
    },
    /// A transient progress line was added
    Update { index: usize, text: String },
    /// The activation finished and the answer is available
    AnswerReady { index: usize, summary: String },
    /// A subagent was spawned
    SubAgentSpawned { id: String, mode: AgentMode },
    /// A subagent finished and deregistered itself
    SubAgentRemoved { id: String },
    /// Cache composition changed in a way the planner input reflects
    CacheChanged,
}

/// Lossy broadcast publisher for state snapshots.  Publishing never blocks
/// and never fails; slow or absent subscribers miss events.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    tx: broadcast::Sender<StateEvent>,
}

impl StatePublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(16));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StateEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
