// SPDX-License-Identifier: MIT
pub mod loader;
pub mod schema;

pub use loader::{find_workspace_root, load, load_custom_instructions};
pub use schema::{
    AgentMode, AgentSettings, CacheSettings, Config, EvictionPolicy, PlannerSettings,
    ToolsSettings,
};
