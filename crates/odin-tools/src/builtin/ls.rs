// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_cache::FileCache;

use crate::policy::glob_to_regex;
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Lists entries of an absolute directory.  Files already held by the file
/// cache are annotated so the planner avoids redundant reads.
pub struct LsTool {
    cache: Arc<FileCache>,
}

impl LsTool {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List entries of a directory. path must be absolute. Directories \
         have a trailing /. Files already in the session cache are marked \
         [cached]. ignore: glob patterns to filter out entries.\n\
         For file pattern search use glob; for content search use grep."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the directory"
                },
                "ignore": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Glob patterns for entry names to skip"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn target_paths(&self, args: &Value) -> Vec<PathBuf> {
        args.get("path")
            .and_then(|v| v.as_str())
            .map(|p| vec![PathBuf::from(p)])
            .unwrap_or_default()
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'path'".into()))?;
        if !Path::new(path).is_absolute() {
            return Err(ToolError::Validation(format!(
                "path must be absolute, got '{path}'"
            )));
        }
        Ok(call.args.clone())
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let path = prepared
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'path'".into()))?
            .to_string();
        let ignore: Vec<regex::Regex> = prepared
            .get("ignore")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(glob_to_regex)
                    .collect()
            })
            .unwrap_or_default();

        debug!(path = %path, "ls tool");

        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_dir() {
            return Err(ToolError::Validation(format!("not a directory: {path}")));
        }

        let mut rd = tokio::fs::read_dir(&path).await?;
        let mut entries: Vec<(String, bool, bool)> = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if ignore.iter().any(|re| re.is_match(&name)) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let cached = !is_dir && self.cache.contains(&Path::new(&path).join(&name));
            entries.push((name, is_dir, cached));
        }
        entries.sort_by(|(a, a_dir, _), (b, b_dir, _)| b_dir.cmp(a_dir).then(a.cmp(b)));

        let listed: Vec<Value> = entries
            .iter()
            .map(|(name, is_dir, cached)| {
                json!({
                    "name": if *is_dir { format!("{name}/") } else { name.clone() },
                    "is_dir": is_dir,
                    "cached": cached,
                })
            })
            .collect();

        let rendered: Vec<String> = entries
            .iter()
            .map(|(name, is_dir, cached)| {
                let suffix = if *is_dir {
                    "/"
                } else if *cached {
                    " [cached]"
                } else {
                    ""
                };
                format!("{name}{suffix}")
            })
            .collect();

        Ok(json!({
            "path": path,
            "entries": listed,
            "listing": rendered.join("\n"),
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let count = raw["entries"].as_array().map(|a| a.len()).unwrap_or(0);
        let path = raw["path"].as_str().unwrap_or("?").to_string();
        Ok(ToolResponse::new(
            raw,
            format!("listed {count} entries in {path}"),
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
