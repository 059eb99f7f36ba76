// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_cache::{CachedSegment, FileCache, FileStat};

use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

const DEFAULT_HEAD_LIMIT: usize = 100;

/// Pattern search built on ripgrep.  In content mode every window shown to
/// the planner (match lines plus requested context) is written into the
/// file cache as a segment; a window covering the whole file installs a
/// full entry instead.  The cache is consulted before files are re-read.
pub struct GrepTool {
    cache: Arc<FileCache>,
    root: PathBuf,
}

impl GrepTool {
    pub fn new(cache: Arc<FileCache>, root: PathBuf) -> Self {
        Self { cache, root }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Pattern search built on ripgrep. pattern: full regex.\n\
         output_mode: content (default, shows numbered lines with context) | \
         files_with_matches | count.\n\
         Options: case_insensitive, before_context/after_context/context \
         (lines around each match), head_limit (default 100 matches), \
         multiline, glob (e.g. '*.rs'), type (e.g. 'rust').\n\
         Content mode feeds what it reads into the session file cache, so \
         repeat searches and later edits avoid re-reading files.\n\
         Use files_with_matches for discovery, then content mode for detail."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (default: workspace root)"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output format (default content)"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default false)"
                },
                "line_numbers": {
                    "type": "boolean",
                    "description": "Prefix content lines with line numbers (default true)"
                },
                "before_context": {
                    "type": "integer",
                    "description": "Lines of context before each match"
                },
                "after_context": {
                    "type": "integer",
                    "description": "Lines of context after each match"
                },
                "context": {
                    "type": "integer",
                    "description": "Lines of context before and after each match"
                },
                "head_limit": {
                    "type": "integer",
                    "description": "Maximum number of matches to process (default 100)"
                },
                "multiline": {
                    "type": "boolean",
                    "description": "Allow patterns to span lines (default false)"
                },
                "glob": {
                    "type": "string",
                    "description": "Glob filter for file names, e.g. '*.rs'"
                },
                "type": {
                    "type": "string",
                    "description": "File type filter, e.g. 'rust', 'go'"
                }
            },
            "required": ["pattern"],
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
        if call.args.get("pattern").and_then(|v| v.as_str()).is_none() {
            return Err(ToolError::Validation(
                "missing required parameter 'pattern'".into(),
            ));
        }
        if let Some(mode) = call.args.get("output_mode").and_then(|v| v.as_str()) {
            if !["content", "files_with_matches", "count"].contains(&mode) {
                return Err(ToolError::Validation(format!(
                    "invalid output_mode '{mode}'"
                )));
            }
        }
        Ok(call.args.clone())
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let opts = GrepOptions::from_args(&prepared, &self.root);
        debug!(pattern = %opts.pattern, path = %opts.path.display(), mode = %opts.output_mode, "grep tool");

        let raw = run_search(&opts).await?;

        match opts.output_mode.as_str() {
            "files_with_matches" | "count" => {
                let lines: Vec<&str> = raw.lines().take(opts.head_limit).collect();
                let truncated = raw.lines().count() > opts.head_limit;
                let mut output = lines.join("\n");
                if truncated {
                    output.push_str("\n...[truncated; narrow the search to see all results]");
                }
                Ok(json!({
                    "pattern": opts.pattern,
                    "output_mode": opts.output_mode,
                    "output": output,
                    "match_count": raw.lines().count(),
                    "cached_files": [],
                }))
            }
            _ => {
                let matches = parse_matches(&raw, opts.head_limit);
                let truncated = raw.lines().count() > opts.head_limit;
                let (output, cached_files) = self.render_and_cache(&opts, &matches).await;
                let mut output = output;
                if truncated {
                    output.push_str("\n...[more matches not shown; narrow the search]");
                }
                Ok(json!({
                    "pattern": opts.pattern,
                    "output_mode": "content",
                    "output": output,
                    "match_count": matches.values().map(|v| v.len()).sum::<usize>(),
                    "cached_files": cached_files,
                }))
            }
        }
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let pattern = raw["pattern"].as_str().unwrap_or("?").to_string();
        let count = raw["match_count"].as_u64().unwrap_or(0);
        Ok(ToolResponse::new(
            raw,
            format!("grep '{pattern}' ({count} matches)"),
        ))
    }
}

struct GrepOptions {
    pattern: String,
    path: PathBuf,
    output_mode: String,
    case_insensitive: bool,
    line_numbers: bool,
    before: usize,
    after: usize,
    head_limit: usize,
    multiline: bool,
    glob: Option<String>,
    file_type: Option<String>,
}

impl GrepOptions {
    fn from_args(args: &Value, root: &Path) -> Self {
        let context = args.get("context").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let before = args
            .get("before_context")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(context);
        let after = args
            .get("after_context")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(context);
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| root.to_path_buf());
        Self {
            pattern: args
                .get("pattern")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            path: if path.is_absolute() {
                path
            } else {
                root.join(path)
            },
            output_mode: args
                .get("output_mode")
                .and_then(|v| v.as_str())
                .unwrap_or("content")
                .to_string(),
            case_insensitive: args
                .get("case_insensitive")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            line_numbers: args
                .get("line_numbers")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            before,
            after,
            head_limit: args
                .get("head_limit")
                .and_then(|v| v.as_u64())
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_HEAD_LIMIT),
            multiline: args.get("multiline").and_then(|v| v.as_bool()).unwrap_or(false),
            glob: args.get("glob").and_then(|v| v.as_str()).map(str::to_string),
            file_type: args.get("type").and_then(|v| v.as_str()).map(str::to_string),
        }
    }
}

/// Run ripgrep (or grep when rg is unavailable) and return raw
/// `path:line:text` / `-l` / `-c` output.
async fn run_search(opts: &GrepOptions) -> Result<String, ToolError> {
    let has_rg = tokio::process::Command::new("which")
        .arg("rg")
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    let output = if has_rg {
        let mut args = vec!["--color".to_string(), "never".to_string()];
        match opts.output_mode.as_str() {
            "files_with_matches" => args.push("-l".into()),
            "count" => args.push("-c".into()),
            _ => {
                args.push("--line-number".into());
                args.push("--no-heading".into());
                args.push("--with-filename".into());
            }
        }
        if opts.case_insensitive {
            args.push("--ignore-case".into());
        }
        if opts.multiline {
            args.push("-U".into());
            args.push("--multiline-dotall".into());
        }
        if let Some(glob) = &opts.glob {
            args.push("-g".into());
            args.push(glob.clone());
        }
        if let Some(ft) = &opts.file_type {
            args.push("--type".into());
            args.push(ft.clone());
        }
        args.push(opts.pattern.clone());
        args.push(opts.path.display().to_string());

        tokio::process::Command::new("rg")
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?
    } else {
        let mut args = vec!["-rn".to_string(), "-H".to_string()];
        match opts.output_mode.as_str() {
            "files_with_matches" => args.push("-l".into()),
            "count" => args.push("-c".into()),
            _ => {}
        }
        if opts.case_insensitive {
            args.push("-i".into());
        }
        if let Some(glob) = &opts.glob {
            args.push("--include".into());
            args.push(glob.clone());
        }
        args.push(opts.pattern.clone());
        args.push(opts.path.display().to_string());

        tokio::process::Command::new("grep")
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?
    };

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `path:line:text` output into per-file match line numbers, keeping
/// file discovery order.  `limit` caps the total matches taken.
fn parse_matches(raw: &str, limit: usize) -> BTreeMap<PathBuf, Vec<u32>> {
    let mut matches: BTreeMap<PathBuf, Vec<u32>> = BTreeMap::new();
    for line in raw.lines().take(limit) {
        let mut parts = line.splitn(3, ':');
        let (Some(path), Some(lineno)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(lineno) = lineno.parse::<u32>() else {
            continue;
        };
        matches.entry(PathBuf::from(path)).or_default().push(lineno);
    }
    matches
}

/// Merge match lines into context windows: `[line - before, line + after]`,
/// clamped to the file, overlapping windows joined.
fn build_windows(lines: &[u32], before: usize, after: usize, total_lines: u32) -> Vec<(u32, u32)> {
    let mut windows: Vec<(u32, u32)> = Vec::new();
    for &line in lines {
        let start = line.saturating_sub(before as u32).max(1);
        let end = (line + after as u32).min(total_lines.max(line));
        match windows.last_mut() {
            Some((_, last_end)) if start <= *last_end + 1 => {
                *last_end = (*last_end).max(end);
            }
            _ => windows.push((start, end)),
        }
    }
    windows
}

impl GrepTool {
    /// Render the matched windows and feed them into the file cache:
    /// a window spanning the whole file installs a full entry, anything
    /// narrower becomes a segment.  Cached full content is used instead of
    /// re-reading the file when it is still fresh.
    async fn render_and_cache(
        &self,
        opts: &GrepOptions,
        matches: &BTreeMap<PathBuf, Vec<u32>>,
    ) -> (String, Vec<String>) {
        let mut blocks: Vec<String> = Vec::new();
        let mut cached_files: Vec<String> = Vec::new();

        for (file, lines) in matches {
            let content = match self.cache.get(file).and_then(|s| s.full_content) {
                Some(cached) => cached,
                None => match tokio::fs::read_to_string(file).await {
                    Ok(c) => c,
                    Err(_) => continue,
                },
            };
            let file_lines: Vec<&str> = content.lines().collect();
            let total = file_lines.len() as u32;
            let windows = build_windows(lines, opts.before, opts.after, total);

            let whole_file = windows.len() == 1 && windows[0] == (1, total) && total > 0;
            if whole_file {
                if let Some(stat) = FileStat::of(file) {
                    self.cache.put_full(file, &content, stat);
                    cached_files.push(file.display().to_string());
                }
            }

            let mut block = format!("== {} ==\n", file.display());
            for (start, end) in &windows {
                let slice: Vec<String> = (*start..=*end)
                    .filter_map(|n| file_lines.get((n - 1) as usize).map(|l| (n, *l)))
                    .map(|(n, l)| {
                        if opts.line_numbers {
                            format!("{n}:{l}")
                        } else {
                            l.to_string()
                        }
                    })
                    .collect();
                block.push_str(&slice.join("\n"));
                block.push('\n');
                if !whole_file {
                    let text = (*start..=*end)
                        .filter_map(|n| file_lines.get((n - 1) as usize).copied())
                        .collect::<Vec<_>>()
                        .join("\n");
                    self.cache
                        .put_segment(file, CachedSegment::new(*start, *end, text));
                    if !cached_files.contains(&file.display().to_string()) {
                        cached_files.push(file.display().to_string());
                    }
                }
            }
            blocks.push(block.trim_end().to_string());
        }

        if blocks.is_empty() {
            ("(no matches)".to_string(), cached_files)
        } else {
            (blocks.join("\n\n"), cached_files)
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use odin_config::CacheSettings;
    use serde_json::json;

    use super::*;

    fn tool_in(root: &Path) -> (GrepTool, Arc<FileCache>) {
        let cache = Arc::new(FileCache::new(CacheSettings {
            enable_auto_refresh: false,
            ..CacheSettings::default()
        }));
        (GrepTool::new(Arc::clone(&cache), root.to_path_buf()), cache)
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "g1".into(),
            name: "grep".into(),
            args,
        }
    }

    async fn run(t: &GrepTool, args: Value) -> Result<ToolResponse, ToolError> {
        let c = call(args);
        let prepared = t.pre_hook(&c).await?;
        let raw = t.execute(&c, prepared).await?;
        t.post_hook(&c, raw).await
    }

    // ── Window building ───────────────────────────────────────────────────────

    #[test]
    fn windows_without_context_are_single_lines() {
        assert_eq!(build_windows(&[3, 7], 0, 0, 10), vec![(3, 3), (7, 7)]);
    }

    #[test]
    fn windows_merge_when_overlapping() {
        assert_eq!(build_windows(&[3, 5], 2, 2, 10), vec![(1, 7)]);
    }

    #[test]
    fn windows_merge_when_adjacent() {
        assert_eq!(build_windows(&[2, 4], 0, 1, 10), vec![(2, 5)]);
    }

    #[test]
    fn windows_clamp_to_file_bounds() {
        assert_eq!(build_windows(&[1, 10], 5, 5, 10), vec![(1, 10)]);
    }

    #[test]
    fn parse_matches_groups_by_file() {
        let raw = "/a.rs:3:fn main\n/a.rs:9:fn other\n/b.rs:1:use std";
        let m = parse_matches(raw, 100);
        assert_eq!(m[&PathBuf::from("/a.rs")], vec![3, 9]);
        assert_eq!(m[&PathBuf::from("/b.rs")], vec![1]);
    }

    #[test]
    fn parse_matches_honors_limit() {
        let raw = "/a.rs:1:x\n/a.rs:2:x\n/a.rs:3:x";
        let m = parse_matches(raw, 2);
        assert_eq!(m[&PathBuf::from("/a.rs")], vec![1, 2]);
    }

    // ── End-to-end against a temp workspace ───────────────────────────────────

    #[tokio::test]
    async fn content_mode_finds_and_caches_whole_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "package main\nfunc main() {}\n").unwrap();

        let (tool, cache) = tool_in(dir.path());
        let resp = run(
            &tool,
            json!({"pattern": "main", "path": file.to_str().unwrap(), "context": 5}),
        )
        .await
        .unwrap();
        assert!(!resp.data["output"].as_str().unwrap().is_empty());

        // Both lines match with generous context → whole file window → full entry.
        let snap = cache.get(&file).expect("file cached");
        assert_eq!(snap.full_content.as_deref(), Some("package main\nfunc main() {}\n"));
        assert!(!snap.is_modified);
    }

    #[tokio::test]
    async fn content_mode_caches_match_windows_as_segments() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        let body: String = (1..=100).map(|i| format!("line {i}\n")).collect();
        let marked = body.replace("line 50\n", "line 50 NEEDLE\n");
        std::fs::write(&file, marked).unwrap();

        let (tool, cache) = tool_in(dir.path());
        run(
            &tool,
            json!({"pattern": "NEEDLE", "path": file.to_str().unwrap(), "context": 2}),
        )
        .await
        .unwrap();

        let snap = cache.get(&file).expect("file cached");
        assert!(snap.is_partial);
        assert!(cache.get_segment(&file, 48, 52).is_some(), "window 48-52 cached");
    }

    #[tokio::test]
    async fn files_with_matches_mode_lists_paths_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "needle here\n").unwrap();

        let (tool, cache) = tool_in(dir.path());
        let resp = run(
            &tool,
            json!({"pattern": "needle", "output_mode": "files_with_matches"}),
        )
        .await
        .unwrap();
        assert!(resp.data["output"].as_str().unwrap().contains("x.txt"));
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn no_matches_yields_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "nothing\n").unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let resp = run(&tool, json!({"pattern": "zzz_does_not_exist"})).await.unwrap();
        assert!(resp.data["output"].as_str().unwrap().contains("no matches"));
        assert_eq!(resp.data["match_count"], 0);
    }

    #[tokio::test]
    async fn missing_pattern_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let err = run(&tool, json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn invalid_output_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let err = run(&tool, json!({"pattern": "x", "output_mode": "weird"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn case_insensitive_flag_matches() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("h.txt");
        std::fs::write(&file, "Hello World\n").unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let resp = run(
            &tool,
            json!({"pattern": "hello", "path": file.to_str().unwrap(), "case_insensitive": true}),
        )
        .await
        .unwrap();
        assert!(resp.data["output"].as_str().unwrap().contains("Hello"));
    }
}
