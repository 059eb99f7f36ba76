// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use odin_cache::FileCache;
use odin_config::{AgentMode, Config};
use odin_planner::ContextItem;
use odin_tools::{SharedContext, TodoItem};

use crate::events::{StateEvent, StatePublisher};
use crate::message::{Message, QueuedMessage, ToolHistoryEntry};

/// Registration record for a live subagent.  `kill` marks its loop for a
/// graceful exit after the current tool completes; it does not forcibly
/// terminate in-flight calls.
#[derive(Debug, Clone)]
pub struct SubAgentHandle {
    pub id: String,
    pub mode: AgentMode,
    cancel: Arc<AtomicBool>,
}

impl SubAgentHandle {
    pub fn new(id: String, mode: AgentMode, cancel: Arc<AtomicBool>) -> Self {
        Self { id, mode, cancel }
    }

    pub fn kill(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

struct ExecFlags {
    is_executing: bool,
    agent_mode: AgentMode,
}

/// Outcome of admission control for an incoming message.
#[derive(Debug)]
pub enum Admission {
    /// The caller owns a new activation and must run it.
    Started(QueuedMessage),
    /// Another activation is running; the message was queued at `position`.
    Queued { position: usize },
}

/// Process-wide shared state, partitioned by lock:
///
/// | lock          | protects                         |
/// |---------------|----------------------------------|
/// | `exec`        | `is_executing`, `agent_mode`     |
/// | `messages`    | message list + per-message fields|
/// | `queue`       | pending queued messages          |
/// | `sub_agents`  | live subagent handles            |
/// | `context`     | retrieved context items (rwlock) |
///
/// The file cache carries its own reader-writer lock.  Lock order is
/// `exec` → `messages` → `queue` → `sub_agents` → cache → stdin (the
/// approval gate); locks are never held across await points or IO.
pub struct SharedState {
    exec: Mutex<ExecFlags>,
    messages: Mutex<Vec<Message>>,
    queue: Mutex<VecDeque<QueuedMessage>>,
    sub_agents: Mutex<Vec<SubAgentHandle>>,
    pub context: SharedContext,
    pub custom_instructions: Option<String>,
    pub config: Arc<Config>,
    pub cache: Arc<FileCache>,
    publisher: StatePublisher,
}

impl SharedState {
    /// Construct the singleton.  Built once at startup (or per subagent),
    /// passed by `Arc`, never replaced.
    pub fn new(config: Arc<Config>, custom_instructions: Option<String>) -> Arc<Self> {
        let cache = Arc::new(FileCache::new(config.cache.clone()));
        Arc::new(Self {
            exec: Mutex::new(ExecFlags {
                is_executing: false,
                agent_mode: config.agent.default_mode,
            }),
            messages: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            sub_agents: Mutex::new(Vec::new()),
            context: Arc::new(RwLock::new(Vec::new())),
            custom_instructions,
            config,
            cache,
            publisher: StatePublisher::default(),
        })
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    // ── Execution flags (state_mx) ────────────────────────────────────────────

    pub fn is_executing(&self) -> bool {
        self.exec.lock().expect("exec lock poisoned").is_executing
    }

    pub fn agent_mode(&self) -> AgentMode {
        self.exec.lock().expect("exec lock poisoned").agent_mode
    }

    /// Admission control: start an activation when idle, queue otherwise.
    /// Takes `exec` then `queue` (the documented lock order) so an
    /// activation finishing concurrently can never strand a queued message.
    pub fn admit(&self, body: String, mode: AgentMode) -> Admission {
        let mut exec = self.exec.lock().expect("exec lock poisoned");
        if exec.is_executing {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            queue.push_back(QueuedMessage::new(body, mode));
            let position = queue.len();
            drop(queue);
            drop(exec);
            self.publisher.publish(StateEvent::MessageQueued { position });
            debug!(position, "message queued");
            Admission::Queued { position }
        } else {
            exec.is_executing = true;
            exec.agent_mode = mode;
            Admission::Started(QueuedMessage::new(body, mode))
        }
    }

    /// End-of-activation handoff: pop the queue head and keep executing,
    /// or release execution when the queue is empty.  Atomic with respect
    /// to [`admit`], so exactly one activation runs at any time.
    pub fn finish_and_pop(&self) -> Option<QueuedMessage> {
        let mut exec = self.exec.lock().expect("exec lock poisoned");
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        match queue.pop_front() {
            Some(next) => {
                exec.agent_mode = next.mode;
                Some(next)
            }
            None => {
                exec.is_executing = false;
                None
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("queue lock poisoned").len()
    }

    // ── Messages (messages_mx) ────────────────────────────────────────────────

    /// Append a new message and return its index.
    pub fn push_message(&self, body: String) -> usize {
        let mut messages = self.messages.lock().expect("messages lock poisoned");
        messages.push(Message::new(body));
        messages.len() - 1
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().expect("messages lock poisoned").len()
    }

    pub fn message(&self, index: usize) -> Option<Message> {
        self.messages
            .lock()
            .expect("messages lock poisoned")
            .get(index)
            .cloned()
    }

    pub fn message_body(&self, index: usize) -> Option<String> {
        self.messages
            .lock()
            .expect("messages lock poisoned")
            .get(index)
            .map(|m| m.body.clone())
    }

    pub fn set_todos(&self, index: usize, todos: Vec<TodoItem>) {
        {
            let mut messages = self.messages.lock().expect("messages lock poisoned");
            if let Some(m) = messages.get_mut(index) {
                m.todos = todos.clone();
            }
        }
        self.publisher
            .publish(StateEvent::TodoUpdate { index, todos });
    }

    pub fn append_tool_history(&self, index: usize, entry: ToolHistoryEntry) {
        {
            let mut messages = self.messages.lock().expect("messages lock poisoned");
            if let Some(m) = messages.get_mut(index) {
                m.tool_history.push(entry.clone());
            }
        }
        self.publisher
            .publish(StateEvent::ToolHistoryAppended { index, entry });
    }

    pub fn push_update(&self, index: usize, text: String) {
        {
            let mut messages = self.messages.lock().expect("messages lock poisoned");
            if let Some(m) = messages.get_mut(index) {
                m.updates.push(text.clone());
            }
        }
        self.publisher.publish(StateEvent::Update { index, text });
    }

    /// Record the final answer and clear the transient updates (to an
    /// empty list, never absent).
    pub fn complete_message(&self, index: usize, summary: String) {
        {
            let mut messages = self.messages.lock().expect("messages lock poisoned");
            if let Some(m) = messages.get_mut(index) {
                m.answer_summary = Some(summary.clone());
                m.updates = Vec::new();
            }
        }
        self.publisher
            .publish(StateEvent::AnswerReady { index, summary });
    }

    // ── Context ───────────────────────────────────────────────────────────────

    pub fn context_items(&self) -> Vec<ContextItem> {
        self.context.read().expect("context lock poisoned").clone()
    }

    pub fn push_context(&self, item: ContextItem) {
        self.context
            .write()
            .expect("context lock poisoned")
            .push(item);
    }

    // ── Subagents (sub_agents_mx) ─────────────────────────────────────────────

    pub fn register_sub_agent(&self, handle: SubAgentHandle) {
        let id = handle.id.clone();
        let mode = handle.mode;
        self.sub_agents
            .lock()
            .expect("sub_agents lock poisoned")
            .push(handle);
        self.publisher
            .publish(StateEvent::SubAgentSpawned { id, mode });
    }

    pub fn remove_sub_agent(&self, id: &str) {
        self.sub_agents
            .lock()
            .expect("sub_agents lock poisoned")
            .retain(|h| h.id != id);
        self.publisher
            .publish(StateEvent::SubAgentRemoved { id: id.to_string() });
    }

    pub fn sub_agent_count(&self) -> usize {
        self.sub_agents
            .lock()
            .expect("sub_agents lock poisoned")
            .len()
    }

    /// Mark every live subagent loop for graceful exit.
    pub fn kill_sub_agents(&self) {
        for handle in self
            .sub_agents
            .lock()
            .expect("sub_agents lock poisoned")
            .iter()
        {
            handle.kill();
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
