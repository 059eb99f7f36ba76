// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

use odin_config::AgentMode;

/// Odin Code — agent execution core for an interactive coding assistant.
///
/// With a PROMPT argument the agent processes that single message and
/// exits; without one it reads messages line by line from stdin.
#[derive(Parser, Debug)]
#[command(name = "odin", version, about)]
pub struct Cli {
    /// One-shot message to process instead of starting the REPL.
    pub prompt: Option<String>,

    /// Mode for submitted messages: ask and plan are read-only, edit may
    /// mutate the workspace.
    #[arg(long, short = 'm', value_enum)]
    pub mode: Option<AgentMode>,

    /// Explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Workspace root override (default: nearest ancestor with ODIN.md).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Approve all safeguard prompts without asking.  For trusted
    /// non-interactive runs only.
    #[arg(long)]
    pub yes: bool,

    /// Log to stderr (RUST_LOG controls the filter).
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
