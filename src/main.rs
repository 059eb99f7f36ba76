// SPDX-License-Identifier: MIT
mod cli;

use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use odin_config::AgentMode;
use odin_core::{CoreDeps, MainAgent, StateEvent};
use odin_planner::{HttpExtractor, HttpPlanner, HttpValidator};
use odin_tools::{ApprovalGate, AutoApprove, StdinApproval};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let cwd = std::env::current_dir()?;
    let workspace_root = cli
        .root
        .clone()
        .unwrap_or_else(|| odin_config::find_workspace_root(&cwd));
    let config = Arc::new(odin_config::load(&workspace_root, cli.config.as_deref())?);

    let gate: Arc<dyn ApprovalGate> = if cli.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdinApproval::new())
    };

    let deps = CoreDeps {
        planner: Arc::new(HttpPlanner::new(config.planner.clone())?),
        validator: Arc::new(HttpValidator::new(config.planner.clone())?),
        extractor: Arc::new(HttpExtractor::new(config.planner.clone())?),
        workspace_root,
        gate,
        config: Arc::clone(&config),
    };

    let default_mode = cli.mode.unwrap_or(config.agent.default_mode);
    let agent = MainAgent::new(deps);

    // Surface progress lines while an activation runs.
    let mut progress = agent.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            if let StateEvent::Update { text, .. } = event {
                eprintln!("  · {text}");
            }
        }
    });

    if let Some(prompt) = cli.prompt {
        let answer = agent.execute_and_wait(prompt, default_mode).await;
        println!("{answer}");
        return Ok(());
    }

    repl(&agent, default_mode).await
}

/// Line-oriented REPL.  `:mode <ask|plan|edit>` switches the mode for
/// subsequent messages; `:quit` exits.
async fn repl(agent: &MainAgent, mut mode: AgentMode) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        write!(stdout, "odin({mode})> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            ":quit" | ":q" => break,
            ":mode ask" => mode = AgentMode::Ask,
            ":mode plan" => mode = AgentMode::Plan,
            ":mode edit" => mode = AgentMode::Edit,
            other if other.starts_with(":mode") => {
                eprintln!("usage: :mode <ask|plan|edit>");
            }
            message => {
                let answer = agent.execute_and_wait(message.to_string(), mode).await;
                println!("{answer}");
            }
        }
    }
    Ok(())
}
