// SPDX-License-Identifier: MIT
pub mod agent;
pub mod agent_tool;
pub mod driver;
pub mod events;
pub mod executor;
pub mod message;
pub mod state;
pub mod toolset;

pub use agent::{CoreDeps, MainAgent, SubAgent};
pub use agent_tool::AgentTool;
pub use driver::{LoopError, PlannerDriver};
pub use events::{StateEvent, StatePublisher};
pub use executor::Executor;
pub use message::{Message, QueuedMessage, ToolHistoryEntry};
pub use state::{SharedState, SubAgentHandle};
pub use toolset::{build_toolset, AgentToolset};
