// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_cache::FileCache;
use odin_config::AgentMode;

use crate::policy::Safeguard;
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Overwrites a file with the given content.  Edit mode only; paths outside
/// the workspace root need explicit approval.  The cache entry is replaced
/// and flagged as modified once the write lands.
pub struct WriteFileTool {
    cache: Arc<FileCache>,
    safeguard: Arc<Safeguard>,
}

impl WriteFileTool {
    pub fn new(cache: Arc<FileCache>, safeguard: Arc<Safeguard>) -> Self {
        Self { cache, safeguard }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes a file to the workspace, overwriting any existing content. \
         ALWAYS prefer editing existing files with edit or multi_edit. \
         NEVER proactively create documentation files unless explicitly \
         requested. Creates parent directories automatically."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Edit]
    }

    fn is_mutating(&self, _args: &Value) -> bool {
        true
    }

    fn target_paths(&self, args: &Value) -> Vec<PathBuf> {
        args.get("path")
            .and_then(|v| v.as_str())
            .map(|p| vec![crate::policy::resolve_workspace_path(self.safeguard.root(), std::path::Path::new(p))])
            .unwrap_or_default()
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'path'".into()))?;
        if call.args.get("content").and_then(|v| v.as_str()).is_none() {
            return Err(ToolError::Validation(
                "missing required parameter 'content'".into(),
            ));
        }
        let resolved = self
            .safeguard
            .authorize_path(std::path::Path::new(path))
            .await?;
        Ok(json!({
            "path": resolved.display().to_string(),
            "content": call.args["content"],
        }))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let path = prepared["path"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'path'".into()))?;
        let content = prepared["content"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'content'".into()))?;

        debug!(path = %path, bytes = content.len(), "write_file tool");

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;

        Ok(json!({
            "path": path,
            "bytes": content.len(),
            "content": content,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let path = PathBuf::from(
            raw["path"]
                .as_str()
                .ok_or_else(|| ToolError::Invariant("raw result lost 'path'".into()))?,
        );
        let content = raw["content"].as_str().unwrap_or_default();
        self.cache.mark_modified(&path, content);

        let bytes = raw["bytes"].as_u64().unwrap_or(0);
        Ok(ToolResponse::new(
            json!({ "path": path.display().to_string(), "bytes": bytes }),
            format!("wrote {bytes} bytes to {}", path.display()),
        )
        .with_affected_files(vec![path]))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
