// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_cache::{check_sufficiency, sha256_hex, FileCache};
use odin_config::AgentMode;
use odin_planner::SufficiencyValidator;

use crate::policy::Safeguard;
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Exact-string replacement within one file.  The pre-hook enforces
/// read-before-write: the file must be cached and the sufficiency
/// validator must judge the cached context adequate for the edit.
pub struct EditTool {
    cache: Arc<FileCache>,
    safeguard: Arc<Safeguard>,
    validator: Arc<dyn SufficiencyValidator>,
}

impl EditTool {
    pub fn new(
        cache: Arc<FileCache>,
        safeguard: Arc<Safeguard>,
        validator: Arc<dyn SufficiencyValidator>,
    ) -> Self {
        Self {
            cache,
            safeguard,
            validator,
        }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Performs exact string replacement in a file. The file must have \
         been read into the session cache first (grep content mode does \
         this). old_string must match the file exactly and occur exactly \
         once — include surrounding lines to disambiguate, or set \
         replace_all to change every occurrence. new_string must differ \
         from old_string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text (must differ from old_string)"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["path", "old_string", "new_string"],
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
            .map(|p| {
                vec![crate::policy::resolve_workspace_path(
                    self.safeguard.root(),
                    std::path::Path::new(p),
                )]
            })
            .unwrap_or_default()
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let (path, old_string, new_string) = parse_edit_args(&call.args)?;
        let replace_all = call
            .args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let resolved = self.safeguard.authorize_path(&path).await?;

        let verdict = check_sufficiency(
            &self.cache,
            self.validator.as_ref(),
            &resolved,
            &old_string,
            &new_string,
        )
        .await
        .map_err(|e| ToolError::Transport(format!("sufficiency validator: {e}")))?;

        if !verdict.is_sufficient {
            return Err(ToolError::CacheInsufficient {
                explanation: verdict.explanation,
                suggested_ranges: verdict.suggested_line_ranges,
            });
        }

        Ok(json!({
            "path": resolved.display().to_string(),
            "old_string": old_string,
            "new_string": new_string,
            "replace_all": replace_all,
        }))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let path = prepared["path"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'path'".into()))?;
        let old_string = prepared["old_string"].as_str().unwrap_or_default();
        let new_string = prepared["new_string"].as_str().unwrap_or_default();
        let replace_all = prepared["replace_all"].as_bool().unwrap_or(false);

        debug!(path = %path, replace_all, "edit tool");

        let current = tokio::fs::read_to_string(path).await?;
        detect_external_modification(&self.cache, path, &current)?;
        let (updated, replacements) =
            apply_replacement(&current, old_string, new_string, replace_all)?;
        tokio::fs::write(path, &updated).await?;

        Ok(json!({
            "path": path,
            "new_content": updated,
            "replacements": replacements,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let path = PathBuf::from(
            raw["path"]
                .as_str()
                .ok_or_else(|| ToolError::Invariant("raw result lost 'path'".into()))?,
        );
        let new_content = raw["new_content"].as_str().unwrap_or_default();
        self.cache.mark_modified(&path, new_content);

        let replacements = raw["replacements"].as_u64().unwrap_or(0);
        Ok(ToolResponse::new(
            json!({
                "path": path.display().to_string(),
                "replacements": replacements,
            }),
            format!(
                "replaced {replacements} occurrence(s) in {}",
                path.display()
            ),
        )
        .with_affected_files(vec![path]))
    }
}

pub(crate) fn parse_edit_args(args: &Value) -> Result<(PathBuf, String, String), ToolError> {
    let path = args
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Validation("missing required parameter 'path'".into()))?;
    let old_string = args
        .get("old_string")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Validation("missing required parameter 'old_string'".into()))?;
    let new_string = args
        .get("new_string")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Validation("missing required parameter 'new_string'".into()))?;
    if old_string.is_empty() {
        return Err(ToolError::Validation("old_string must not be empty".into()));
    }
    if old_string == new_string {
        return Err(ToolError::Validation(
            "new_string must differ from old_string".into(),
        ));
    }
    Ok((
        PathBuf::from(path),
        old_string.to_string(),
        new_string.to_string(),
    ))
}

/// Compare the current on-disk content against the cached hash.  A
/// divergence means something outside this session rewrote the file after
/// it was read; the entry is invalidated and the edit refused.
pub(crate) fn detect_external_modification(
    cache: &FileCache,
    path: &str,
    on_disk: &str,
) -> Result<(), ToolError> {
    let path_ref = std::path::Path::new(path);
    if let Some(snap) = cache.get(path_ref) {
        if let Some(hash) = &snap.content_hash {
            if sha256_hex(on_disk) != *hash {
                cache.invalidate(path_ref);
                return Err(ToolError::ExternalModification(format!(
                    "{path} changed on disk since it was read; read it again before editing"
                )));
            }
        }
    }
    Ok(())
}

/// Apply an exact-string replacement to `content`.  Without `replace_all`
/// the target must occur exactly once; with it, at least once.
pub(crate) fn apply_replacement(
    content: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<(String, usize), ToolError> {
    let occurrences = content.matches(old_string).count();
    if occurrences == 0 {
        return Err(ToolError::TargetNotFound(format!(
            "old_string not found in current file content: {}",
            preview(old_string)
        )));
    }
    if occurrences > 1 && !replace_all {
        return Err(ToolError::Validation(format!(
            "old_string occurs {occurrences} times; add surrounding context \
             to make it unique or set replace_all"
        )));
    }
    if replace_all {
        Ok((content.replace(old_string, new_string), occurrences))
    } else {
        Ok((content.replacen(old_string, new_string, 1), 1))
    }
}

fn preview(s: &str) -> String {
    let flat = s.replace('\n', "\\n");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use odin_cache::{sha256_hex, FileStat};
    use odin_config::CacheSettings;
    use odin_planner::{LineRange, ScriptedValidator, StaticValidator, SufficiencyVerdict};
    use serde_json::json;

    use crate::approval::DenyAll;
    use crate::policy::CommandPolicy;

    use super::*;

    fn tool_in(
        root: &std::path::Path,
        validator: Arc<dyn SufficiencyValidator>,
    ) -> (EditTool, Arc<FileCache>) {
        let cache = Arc::new(FileCache::new(CacheSettings::default()));
        let safeguard = Arc::new(Safeguard::new(
            root.to_path_buf(),
            CommandPolicy::new(&[], &[]),
            Arc::new(DenyAll),
        ));
        (
            EditTool::new(Arc::clone(&cache), safeguard, validator),
            cache,
        )
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "e1".into(),
            name: "edit".into(),
            args,
        }
    }

    async fn run(t: &EditTool, args: Value) -> Result<ToolResponse, ToolError> {
        let c = call(args);
        let prepared = t.pre_hook(&c).await?;
        let raw = t.execute(&c, prepared).await?;
        t.post_hook(&c, raw).await
    }

    fn seed(cache: &FileCache, path: &std::path::Path, content: &str) {
        std::fs::write(path, content).unwrap();
        cache.put_full(path, content, FileStat::of(path).unwrap());
    }

    // ── Replacement mechanics ─────────────────────────────────────────────────

    #[test]
    fn unique_occurrence_replaced() {
        let (out, n) = apply_replacement("a TODO b", "TODO", "FIXME", false).unwrap();
        assert_eq!(out, "a FIXME b");
        assert_eq!(n, 1);
    }

    #[test]
    fn absent_target_is_target_not_found() {
        let err = apply_replacement("abc", "xyz", "q", false).unwrap_err();
        assert!(matches!(err, ToolError::TargetNotFound(_)));
    }

    #[test]
    fn ambiguous_target_rejected_without_replace_all() {
        let err = apply_replacement("x x", "x", "y", false).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn replace_all_handles_multiple_occurrences() {
        let (out, n) = apply_replacement("x x x", "x", "y", true).unwrap();
        assert_eq!(out, "y y y");
        assert_eq!(n, 3);
    }

    // ── Pre-hook gating ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn uncached_file_rejected_with_cache_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path(), Arc::new(StaticValidator::sufficient()));
        let file = dir.path().join("foo.go");
        std::fs::write(&file, "X marks the spot").unwrap();
        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "old_string": "X", "new_string": "Y"}),
        )
        .await
        .unwrap_err();
        match err {
            ToolError::CacheInsufficient { explanation, .. } => {
                assert!(explanation.contains("must read file first"));
            }
            other => panic!("expected CacheInsufficient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insufficient_verdict_carries_suggested_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = SufficiencyVerdict {
            is_sufficient: false,
            explanation: "context too narrow".into(),
            suggested_line_ranges: vec![LineRange {
                start_line: 1,
                end_line: 40,
                reason: "whole function needed".into(),
            }],
        };
        let (tool, cache) = tool_in(dir.path(), Arc::new(StaticValidator::with_verdict(verdict)));
        let file = dir.path().join("auth.go");
        seed(&cache, &file, "func a() { TODO }");
        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "old_string": "TODO", "new_string": "FIXME"}),
        )
        .await
        .unwrap_err();
        match err {
            ToolError::CacheInsufficient {
                suggested_ranges, ..
            } => assert_eq!(suggested_ranges[0].end_line, 40),
            other => panic!("expected CacheInsufficient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn equal_old_and_new_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path(), Arc::new(StaticValidator::sufficient()));
        let err = run(
            &tool,
            json!({"path": "a.rs", "old_string": "same", "new_string": "same"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    // ── End-to-end edit ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn cached_file_edit_updates_disk_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Arc::new(ScriptedValidator::new(vec![]));
        let (tool, cache) = tool_in(dir.path(), validator.clone());
        let file = dir.path().join("auth.go");
        seed(&cache, &file, "func login() {\n    // TODO\n}\n");

        let resp = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "old_string": "TODO", "new_string": "FIXME"}),
        )
        .await
        .unwrap();

        let on_disk = std::fs::read_to_string(&file).unwrap();
        assert!(on_disk.contains("FIXME"));
        assert!(!on_disk.contains("TODO"));

        let snap = cache.get(&file).unwrap();
        assert!(snap.is_modified);
        assert_eq!(snap.content_hash.as_deref(), Some(sha256_hex(&on_disk).as_str()));
        assert_eq!(resp.affected_files, vec![file.clone()]);

        // The validator saw the cached content.
        let reqs = validator.requests.lock().unwrap();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].content.contains("func login"));
    }

    #[tokio::test]
    async fn externally_modified_file_is_refused_and_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, cache) = tool_in(dir.path(), Arc::new(StaticValidator::sufficient()));
        let file = dir.path().join("drift.rs");
        // Disk and cache disagree while the mtime still matches the entry.
        std::fs::write(&file, "disk version with TODO").unwrap();
        cache.put_full(&file, "cached version with TODO", FileStat::of(&file).unwrap());

        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "old_string": "TODO", "new_string": "FIXME"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::ExternalModification(_)));
        assert!(cache.get(&file).is_none(), "entry invalidated");
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "disk version with TODO",
            "file untouched"
        );
    }

    #[tokio::test]
    async fn stale_old_string_on_disk_is_target_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, cache) = tool_in(dir.path(), Arc::new(StaticValidator::sufficient()));
        let file = dir.path().join("m.rs");
        seed(&cache, &file, "alpha beta");
        // The edit targets text that never existed on disk.
        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "old_string": "gamma", "new_string": "delta"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::TargetNotFound(_)));
        // No write happened.
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "alpha beta");
    }
}
