// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::policy::Safeguard;
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

const OUTPUT_LIMIT: usize = 100_000;

/// Runs a shell command under the safeguard policy: forbidden patterns are
/// refused outright, allowed patterns inside the workspace run directly,
/// everything else goes through the approval gate.
pub struct ExecuteCommandTool {
    safeguard: Arc<Safeguard>,
    pub timeout_secs: u64,
}

impl ExecuteCommandTool {
    pub fn new(safeguard: Arc<Safeguard>, timeout_secs: u64) -> Self {
        Self {
            safeguard,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Executes a shell command. Use for terminal operations like git, \
         cargo, make. DO NOT use it for file operations — use the ls, grep, \
         glob, edit and write_file tools instead.\n\
         Independent commands: call execute_command multiple times in the \
         same turn. Dependent commands: chain with '&&' in a single call.\n\
         Output is capped at 100,000 characters. Non-zero exit codes are \
         returned as errors; check the exit code in the output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to the workspace root)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn is_mutating(&self, args: &Value) -> bool {
        // A command running outside the workspace root is treated as a
        // mutation for collision purposes.
        args.get("workdir")
            .and_then(|v| v.as_str())
            .map(|wd| !self.safeguard.is_within_root(std::path::Path::new(wd)))
            .unwrap_or(false)
    }

    fn target_paths(&self, args: &Value) -> Vec<PathBuf> {
        args.get("workdir")
            .and_then(|v| v.as_str())
            .map(|wd| vec![PathBuf::from(wd)])
            .unwrap_or_default()
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let command = call
            .args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'command'".into()))?;
        let workdir = call
            .args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.safeguard.root().to_path_buf());

        self.safeguard.authorize_command(command, &workdir).await?;

        Ok(json!({
            "command": command,
            "workdir": workdir.display().to_string(),
            "timeout_secs": call.args.get("timeout_secs").and_then(|v| v.as_u64())
                .unwrap_or(self.timeout_secs),
        }))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let command = prepared["command"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'command'".into()))?;
        let workdir = prepared["workdir"].as_str().unwrap_or(".");
        let timeout = prepared["timeout_secs"].as_u64().unwrap_or(self.timeout_secs);

        debug!(cmd = %command, workdir = %workdir, "execute_command tool");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(workdir);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(timeout),
            cmd.output(),
        )
        .await;

        let output = match result {
            Ok(io_result) => io_result?,
            Err(_) => return Err(ToolError::Timeout { secs: timeout }),
        };

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout), OUTPUT_LIMIT);
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr), OUTPUT_LIMIT);
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let mut combined = stdout;
            if !stderr.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str("[stderr]\n");
                combined.push_str(&stderr);
            }
            return Err(ToolError::CommandFailed {
                exit_code,
                output: combined,
            });
        }

        Ok(json!({
            "command": command,
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let command = raw["command"].as_str().unwrap_or("?").to_string();
        let exit_code = raw["exit_code"].as_i64().unwrap_or(-1);
        Ok(ToolResponse::new(
            raw,
            format!("ran `{command}` (exit {exit_code})"),
        ))
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        format!("{}...[truncated {} bytes]", &s[..limit], s.len() - limit)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
