// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use odin_cache::FileCache;
use odin_config::AgentMode;

use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv"];

/// Discovers the repository layout and writes `ODIN.md` at the workspace
/// root: project overview, architecture, components, and run/build/test
/// commands.  The generated file doubles as the custom instructions read
/// at startup.
pub struct InitTool {
    cache: Arc<FileCache>,
    root: PathBuf,
}

impl InitTool {
    pub fn new(cache: Arc<FileCache>, root: PathBuf) -> Self {
        Self { cache, root }
    }
}

#[async_trait]
impl Tool for InitTool {
    fn name(&self) -> &str {
        "init"
    }

    fn description(&self) -> &str {
        "Analyze the repository structure and write ODIN.md at the \
         workspace root with project overview, architecture, components \
         and build/test commands. Overwrites an existing ODIN.md."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Edit]
    }

    fn is_mutating(&self, _args: &Value) -> bool {
        true
    }

    fn target_paths(&self, _args: &Value) -> Vec<PathBuf> {
        vec![self.root.join("ODIN.md")]
    }

    async fn execute(&self, _call: &ToolCall, _prepared: Value) -> Result<Value, ToolError> {
        debug!(root = %self.root.display(), "init tool");

        let survey = survey_repo(&self.root);
        let document = render_odin_md(&self.root, &survey);
        let target = self.root.join("ODIN.md");
        tokio::fs::write(&target, &document).await?;

        Ok(json!({
            "path": target.display().to_string(),
            "content": document,
            "top_dirs": survey.top_dirs,
            "manifests": survey.manifests,
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

        Ok(ToolResponse::new(
            json!({
                "path": path.display().to_string(),
                "top_dirs": raw["top_dirs"],
                "manifests": raw["manifests"],
            }),
            format!("wrote {}", path.display()),
        )
        .with_affected_files(vec![path]))
    }
}

struct RepoSurvey {
    top_dirs: Vec<String>,
    manifests: Vec<String>,
    /// extension → file count, most common first
    languages: Vec<(String, usize)>,
}

fn survey_repo(root: &std::path::Path) -> RepoSurvey {
    let mut top_dirs: Vec<String> = Vec::new();
    let mut manifests: Vec<String> = Vec::new();
    let mut ext_counts: BTreeMap<String, usize> = BTreeMap::new();

    if let Ok(rd) = std::fs::read_dir(root) {
        for entry in rd.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && !EXCLUDED_DIRS.contains(&name.as_str()) {
                top_dirs.push(name);
            }
        }
    }
    top_dirs.sort();

    for entry in WalkDir::new(root)
        .max_depth(3)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|n| !EXCLUDED_DIRS.contains(&n))
                .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if matches!(
            name.as_str(),
            "Cargo.toml" | "package.json" | "go.mod" | "pyproject.toml" | "Makefile" | "CMakeLists.txt"
        ) {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            manifests.push(rel);
        }
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            *ext_counts.entry(ext.to_string()).or_default() += 1;
        }
    }
    manifests.sort();

    let mut languages: Vec<(String, usize)> = ext_counts
        .into_iter()
        .filter(|(ext, _)| {
            matches!(
                ext.as_str(),
                "rs" | "go" | "py" | "ts" | "tsx" | "js" | "c" | "cpp" | "h" | "java"
            )
        })
        .collect();
    languages.sort_by(|(_, a), (_, b)| b.cmp(a));

    RepoSurvey {
        top_dirs,
        manifests,
        languages,
    }
}

fn render_odin_md(root: &std::path::Path, survey: &RepoSurvey) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".into());

    let mut doc = format!("# {name}\n\n## Project Overview\n\n");
    if let Some((ext, _)) = survey.languages.first() {
        doc.push_str(&format!(
            "Primary language (by file count): `.{ext}`.\n\n"
        ));
    } else {
        doc.push_str("Language could not be determined automatically.\n\n");
    }

    doc.push_str("## Architecture\n\n");
    if survey.top_dirs.is_empty() {
        doc.push_str("Flat repository with no top-level directories.\n\n");
    } else {
        for dir in &survey.top_dirs {
            doc.push_str(&format!("- `{dir}/`\n"));
        }
        doc.push('\n');
    }

    doc.push_str("## Components\n\n");
    if survey.manifests.is_empty() {
        doc.push_str("No build manifests detected.\n\n");
    } else {
        for m in &survey.manifests {
            doc.push_str(&format!("- `{m}`\n"));
        }
        doc.push('\n');
    }

    doc.push_str("## Commands\n\n");
    let mut commands: Vec<&str> = Vec::new();
    if survey.manifests.iter().any(|m| m.ends_with("Cargo.toml")) {
        commands.extend(["cargo build", "cargo test"]);
    }
    if survey.manifests.iter().any(|m| m.ends_with("package.json")) {
        commands.extend(["npm install", "npm test"]);
    }
    if survey.manifests.iter().any(|m| m.ends_with("go.mod")) {
        commands.extend(["go build ./...", "go test ./..."]);
    }
    if survey.manifests.iter().any(|m| m.ends_with("Makefile")) {
        commands.push("make");
    }
    if commands.is_empty() {
        doc.push_str("No standard build commands detected.\n");
    } else {
        for c in commands {
            doc.push_str(&format!("- `{c}`\n"));
        }
    }
    doc
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use odin_config::CacheSettings;
    use serde_json::json;

    use super::*;

    fn tool_in(root: &std::path::Path) -> (InitTool, Arc<FileCache>) {
        let cache = Arc::new(FileCache::new(CacheSettings::default()));
        (InitTool::new(Arc::clone(&cache), root.to_path_buf()), cache)
    }

    async fn run(t: &InitTool) -> ToolResponse {
        let c = ToolCall {
            id: "i1".into(),
            name: "init".into(),
            args: json!({}),
        };
        let prepared = t.pre_hook(&c).await.unwrap();
        let raw = t.execute(&c, prepared).await.unwrap();
        t.post_hook(&c, raw).await.unwrap()
    }

    #[tokio::test]
    async fn writes_odin_md_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();

        let (tool, cache) = tool_in(dir.path());
        let resp = run(&tool).await;

        let doc = std::fs::read_to_string(dir.path().join("ODIN.md")).unwrap();
        assert!(doc.contains("## Project Overview"));
        assert!(doc.contains("## Architecture"));
        assert!(doc.contains("- `src/`"));
        assert!(doc.contains("## Components"));
        assert!(doc.contains("Cargo.toml"));
        assert!(doc.contains("cargo test"));

        assert!(resp.description.contains("ODIN.md"));
        let snap = cache.get(&dir.path().join("ODIN.md")).unwrap();
        assert!(snap.is_modified);
    }

    #[tokio::test]
    async fn excluded_dirs_do_not_appear() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        let (tool, _cache) = tool_in(dir.path());
        run(&tool).await;
        let doc = std::fs::read_to_string(dir.path().join("ODIN.md")).unwrap();
        assert!(doc.contains("- `lib/`"));
        assert!(!doc.contains("- `.git/`"));
    }

    #[test]
    fn only_available_in_edit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _cache) = tool_in(dir.path());
        assert_eq!(tool.modes(), &[AgentMode::Edit]);
        assert!(tool.is_mutating(&json!({})));
        assert_eq!(tool.target_paths(&json!({})), vec![dir.path().join("ODIN.md")]);
    }
}
