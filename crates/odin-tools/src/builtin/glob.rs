// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use odin_cache::FileCache;

use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

const DEFAULT_MAX_RESULTS: usize = 200;

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__"];

/// Find files matching a glob pattern, sorted by modification time
/// descending.  Does not cache content; annotates files the cache already
/// holds.
pub struct GlobTool {
    cache: Arc<FileCache>,
    root: PathBuf,
}

impl GlobTool {
    pub fn new(cache: Arc<FileCache>, root: PathBuf) -> Self {
        Self { cache, root }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. **/*.ts, src/**/*.rs). \
         Results sorted by modification time, newest first. Files already in \
         the session cache are marked [cached]. Excludes .git/ target/ \
         node_modules/ automatically. max_results: 200 by default.\n\
         For content search use grep; for directory structure use ls."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. '**/*.rs' or 'src/*.ts'"
                },
                "root": {
                    "type": "string",
                    "description": "Directory to search from (default: workspace root)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 200)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let pattern = call
            .args
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'pattern'".into()))?;
        if glob_pattern_to_regex(pattern).is_none() {
            return Err(ToolError::Validation(format!(
                "unusable glob pattern '{pattern}'"
            )));
        }
        Ok(call.args.clone())
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let pattern = prepared["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'pattern'".into()))?;
        let search_root = prepared
            .get("root")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());
        let max_results = prepared
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        debug!(pattern = %pattern, root = %search_root.display(), "glob tool");

        let re = glob_pattern_to_regex(pattern)
            .ok_or_else(|| ToolError::Invariant("pattern re-validation failed".into()))?;

        let mut hits: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&search_root)
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !EXCLUDED_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let rel = entry
                .path()
                .strip_prefix(&search_root)
                .unwrap_or(entry.path());
            let rel_str = rel.to_string_lossy();
            if re.is_match(&rel_str) {
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                hits.push((entry.path().to_path_buf(), mtime));
            }
        }

        hits.sort_by(|(_, a), (_, b)| b.cmp(a));
        let truncated = hits.len() > max_results;
        hits.truncate(max_results);

        let files: Vec<Value> = hits
            .iter()
            .map(|(path, _)| {
                json!({
                    "path": path.display().to_string(),
                    "cached": self.cache.contains(path),
                })
            })
            .collect();

        let listing: Vec<String> = hits
            .iter()
            .map(|(path, _)| {
                if self.cache.contains(path) {
                    format!("{} [cached]", path.display())
                } else {
                    path.display().to_string()
                }
            })
            .collect();

        Ok(json!({
            "pattern": pattern,
            "files": files,
            "listing": listing.join("\n"),
            "truncated": truncated,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let pattern = raw["pattern"].as_str().unwrap_or("?").to_string();
        let count = raw["files"].as_array().map(|a| a.len()).unwrap_or(0);
        Ok(ToolResponse::new(
            raw,
            format!("glob '{pattern}' matched {count} files"),
        ))
    }
}

/// Compile a path glob into a regex: `**` crosses directory separators,
/// `*` and `?` stay within one component.  A pattern without a slash is
/// matched against any depth (auto `**/` prefix).
fn glob_pattern_to_regex(pattern: &str) -> Option<Regex> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }
    let effective = if pattern.contains('/') {
        pattern.to_string()
    } else {
        format!("**/{pattern}")
    };

    let mut re = String::from("^");
    let mut chars = effective.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // "**/" matches zero or more whole components
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:[^/]+/)*");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
