// SPDX-License-Identifier: MIT
pub mod approval;
pub mod builtin;
pub mod events;
pub mod policy;
pub mod registry;
pub mod tool;

pub use approval::{ApprovalGate, AutoApprove, DenyAll, StdinApproval};
pub use events::{TodoItem, TodoStatus, ToolEvent};
pub use policy::{CommandDecision, CommandPolicy, Safeguard};
pub use registry::{BatchOutcome, ToolRegistry};
pub use tool::{Tool, ToolCall, ToolError, ToolOutput, ToolResponse};

pub use builtin::context_summarizer::{ContextSummarizerTool, SharedContext};
pub use builtin::edit::EditTool;
pub use builtin::execute_command::ExecuteCommandTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::init::InitTool;
pub use builtin::ls::LsTool;
pub use builtin::multi_edit::MultiEditTool;
pub use builtin::todo_write::TodoWriteTool;
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::write_file::WriteFileTool;
