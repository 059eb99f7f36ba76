// SPDX-License-Identifier: MIT
pub mod http;
pub mod mock;
pub mod protocol;
pub mod provider;

pub use http::{HttpExtractor, HttpPlanner, HttpValidator};
pub use mock::{
    CompletingPlanner, FailingPlanner, PassthroughExtractor, ScriptedPlanner, ScriptedValidator,
    StaticValidator,
};
pub use protocol::{
    CacheKind, CachedFileInfo, CommandRules, ContextItem, ExecuteTool, LineRange, PlannerInput,
    PlannerOutput, SufficiencyRequest, SufficiencyVerdict, ToolDescriptor, ToolResultRecord,
};
pub use provider::{ContentExtractor, PlannerProvider, SufficiencyValidator};
