// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_cache::{check_sufficiency, FileCache};
use odin_config::AgentMode;
use odin_planner::SufficiencyValidator;

use crate::builtin::edit::{apply_replacement, detect_external_modification};
use crate::policy::Safeguard;
use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Atomic ordered batch of exact-string edits against one file.  The edits
/// are applied sequentially to an in-memory buffer; if any single edit
/// fails to find its target nothing is written, leaving the file
/// byte-identical to its pre-call content.  Cannot create files.
pub struct MultiEditTool {
    cache: Arc<FileCache>,
    safeguard: Arc<Safeguard>,
    validator: Arc<dyn SufficiencyValidator>,
}

impl MultiEditTool {
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

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct EditSpec {
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Applies an ordered batch of exact-string edits to one file in a \
         single atomic operation: if any edit fails to find its target, no \
         change is written at all. Edits apply sequentially — each one \
         operates on the result of the previous. The file must be in the \
         session cache first. Cannot create files; use write_file for that."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file"
                },
                "edits": {
                    "type": "array",
                    "minItems": 1,
                    "description": "Ordered list of replacements",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": {
                                "type": "string",
                                "description": "The exact text to replace"
                            },
                            "new_string": {
                                "type": "string",
                                "description": "The replacement text"
                            },
                            "replace_all": {
                                "type": "boolean",
                                "description": "Replace every occurrence (default false)"
                            }
                        },
                        "required": ["old_string", "new_string"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["path", "edits"],
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
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'path'".into()))?;
        let edits: Vec<EditSpec> = serde_json::from_value(
            call.args
                .get("edits")
                .cloned()
                .ok_or_else(|| ToolError::Validation("missing required parameter 'edits'".into()))?,
        )
        .map_err(|e| ToolError::Validation(format!("malformed 'edits': {e}")))?;

        if edits.is_empty() {
            return Err(ToolError::Validation("'edits' must not be empty".into()));
        }
        for (i, edit) in edits.iter().enumerate() {
            if edit.old_string.is_empty() {
                return Err(ToolError::Validation(format!(
                    "edit #{i}: old_string must not be empty"
                )));
            }
            if edit.old_string == edit.new_string {
                return Err(ToolError::Validation(format!(
                    "edit #{i}: new_string must differ from old_string"
                )));
            }
        }

        let resolved = self
            .safeguard
            .authorize_path(std::path::Path::new(path))
            .await?;

        // Sufficiency over every target in order; the first insufficient
        // verdict rejects the whole batch.
        for edit in &edits {
            let verdict = check_sufficiency(
                &self.cache,
                self.validator.as_ref(),
                &resolved,
                &edit.old_string,
                &edit.new_string,
            )
            .await
            .map_err(|e| ToolError::Transport(format!("sufficiency validator: {e}")))?;
            if !verdict.is_sufficient {
                return Err(ToolError::CacheInsufficient {
                    explanation: verdict.explanation,
                    suggested_ranges: verdict.suggested_line_ranges,
                });
            }
        }

        Ok(json!({
            "path": resolved.display().to_string(),
            "edits": serde_json::to_value(edits).unwrap_or(Value::Null),
        }))
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let path = prepared["path"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'path'".into()))?;
        let edits: Vec<EditSpec> = serde_json::from_value(prepared["edits"].clone())
            .map_err(|e| ToolError::Invariant(format!("prepared edits unreadable: {e}")))?;

        debug!(path = %path, edits = edits.len(), "multi_edit tool");

        let original = tokio::fs::read_to_string(path).await?;
        detect_external_modification(&self.cache, path, &original)?;
        let mut buffer = original.clone();
        let mut total_replacements = 0usize;

        for (i, edit) in edits.iter().enumerate() {
            match apply_replacement(&buffer, &edit.old_string, &edit.new_string, edit.replace_all) {
                Ok((updated, n)) => {
                    buffer = updated;
                    total_replacements += n;
                }
                Err(ToolError::TargetNotFound(msg)) => {
                    // Revert by never writing; the file on disk is untouched.
                    return Err(ToolError::TargetNotFound(format!("edit #{i}: {msg}")));
                }
                Err(other) => {
                    return Err(match other {
                        ToolError::Validation(msg) => {
                            ToolError::Validation(format!("edit #{i}: {msg}"))
                        }
                        e => e,
                    })
                }
            }
        }

        tokio::fs::write(path, &buffer).await?;

        Ok(json!({
            "path": path,
            "new_content": buffer,
            "edits_applied": edits.len(),
            "replacements": total_replacements,
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

        let applied = raw["edits_applied"].as_u64().unwrap_or(0);
        let replacements = raw["replacements"].as_u64().unwrap_or(0);
        Ok(ToolResponse::new(
            json!({
                "path": path.display().to_string(),
                "edits_applied": applied,
                "replacements": replacements,
            }),
            format!(
                "applied {applied} edits ({replacements} replacements) to {}",
                path.display()
            ),
        )
        .with_affected_files(vec![path]))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use odin_cache::FileStat;
    use odin_config::CacheSettings;
    use odin_planner::StaticValidator;
    use serde_json::json;

    use crate::approval::DenyAll;
    use crate::policy::CommandPolicy;

    use super::*;

    fn tool_in(root: &std::path::Path) -> (MultiEditTool, Arc<FileCache>) {
        let cache = Arc::new(FileCache::new(CacheSettings::default()));
        let safeguard = Arc::new(Safeguard::new(
            root.to_path_buf(),
            CommandPolicy::new(&[], &[]),
            Arc::new(DenyAll),
        ));
        (
            MultiEditTool::new(
                Arc::clone(&cache),
                safeguard,
                Arc::new(StaticValidator::sufficient()),
            ),
            cache,
        )
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "m1".into(),
            name: "multi_edit".into(),
            args,
        }
    }

    async fn run(t: &MultiEditTool, args: Value) -> Result<ToolResponse, ToolError> {
        let c = call(args);
        let prepared = t.pre_hook(&c).await?;
        let raw = t.execute(&c, prepared).await?;
        t.post_hook(&c, raw).await
    }

    fn seed(cache: &FileCache, path: &std::path::Path, content: &str) {
        std::fs::write(path, content).unwrap();
        cache.put_full(path, content, FileStat::of(path).unwrap());
    }

    #[tokio::test]
    async fn ordered_edits_apply_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, cache) = tool_in(dir.path());
        let file = dir.path().join("seq.txt");
        seed(&cache, &file, "one two three");

        let resp = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "edits": [
                {"old_string": "two", "new_string": "2"},
                {"old_string": "one 2", "new_string": "1 2"}
            ]}),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "1 2 three");
        assert!(resp.description.contains("applied 2 edits"));

        let snap = cache.get(&file).unwrap();
        assert!(snap.is_modified);
        assert_eq!(snap.full_content.as_deref(), Some("1 2 three"));
    }

    #[tokio::test]
    async fn failed_edit_leaves_file_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, cache) = tool_in(dir.path());
        let file = dir.path().join("atomic.txt");
        seed(&cache, &file, "alpha beta gamma");

        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "edits": [
                {"old_string": "alpha", "new_string": "A"},
                {"old_string": "does_not_exist", "new_string": "X"}
            ]}),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ToolError::TargetNotFound(_)));
        assert!(err.to_string().contains("edit #1"));
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "alpha beta gamma",
            "on-disk content must be untouched"
        );
    }

    #[tokio::test]
    async fn replace_all_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, cache) = tool_in(dir.path());
        let file = dir.path().join("all.txt");
        seed(&cache, &file, "x x x");

        let resp = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "edits": [
                {"old_string": "x", "new_string": "y", "replace_all": true}
            ]}),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "y y y");
        assert_eq!(resp.data["replacements"], 3);
    }

    #[tokio::test]
    async fn uncached_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let file = dir.path().join("nope.txt");
        std::fs::write(&file, "content").unwrap();
        let err = run(
            &tool,
            json!({"path": file.to_str().unwrap(), "edits": [
                {"old_string": "content", "new_string": "new"}
            ]}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::CacheInsufficient { .. }));
    }

    #[tokio::test]
    async fn empty_edits_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let err = run(&tool, json!({"path": "a.txt", "edits": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn identical_old_and_new_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        let err = run(
            &tool,
            json!({"path": "a.txt", "edits": [
                {"old_string": "same", "new_string": "same"}
            ]}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }
}
