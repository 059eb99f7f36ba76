// SPDX-License-Identifier: MIT
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_planner::ContextItem;

use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

/// Shared view of the retrieved-context list, owned by the core state and
/// handed to this tool at registry construction.
pub type SharedContext = Arc<RwLock<Vec<ContextItem>>>;

const DEFAULT_ITEM_BUDGET: usize = 400;

/// Produces a condensed representation of the current context for prompt
/// budgeting.  Condensation is deterministic head truncation per item;
/// what to keep beyond that is the planner's concern.
pub struct ContextSummarizerTool {
    context: SharedContext,
}

impl ContextSummarizerTool {
    pub fn new(context: SharedContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for ContextSummarizerTool {
    fn name(&self) -> &str {
        "context_summarizer"
    }

    fn description(&self) -> &str {
        "Condense the retrieved context items of the current message into a \
         compact digest for prompt budgeting. Each item is reduced to its \
         source plus the leading portion of its content.\n\
         item_budget: characters kept per item (default 400)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_budget": {
                    "type": "integer",
                    "description": "Maximum characters retained per context item (default 400)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let budget = prepared
            .get("item_budget")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_ITEM_BUDGET)
            .max(16);

        let items = self
            .context
            .read()
            .map_err(|_| ToolError::Invariant("context lock poisoned".into()))?
            .clone();

        debug!(items = items.len(), budget, "context_summarizer tool");

        let mut sections: Vec<String> = Vec::with_capacity(items.len());
        for item in &items {
            let source = item
                .file_path
                .clone()
                .or_else(|| item.source_command.as_ref().map(|c| format!("$ {c}")))
                .unwrap_or_else(|| "(inline)".into());
            let head: String = item.content.chars().take(budget).collect();
            let marker = if item.content.chars().count() > budget {
                "…"
            } else {
                ""
            };
            sections.push(format!("## {source}\n{head}{marker}"));
        }

        Ok(json!({
            "item_count": items.len(),
            "summary": sections.join("\n\n"),
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let count = raw["item_count"].as_u64().unwrap_or(0);
        Ok(ToolResponse::new(
            raw,
            format!("condensed {count} context items"),
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool_with(items: Vec<ContextItem>) -> ContextSummarizerTool {
        ContextSummarizerTool::new(Arc::new(RwLock::new(items)))
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "s1".into(),
            name: "context_summarizer".into(),
            args,
        }
    }

    async fn run(t: &ContextSummarizerTool, args: Value) -> ToolResponse {
        let c = call(args);
        let prepared = t.pre_hook(&c).await.unwrap();
        let raw = t.execute(&c, prepared).await.unwrap();
        t.post_hook(&c, raw).await.unwrap()
    }

    #[tokio::test]
    async fn empty_context_summarizes_to_nothing() {
        let t = tool_with(vec![]);
        let resp = run(&t, json!({})).await;
        assert_eq!(resp.data["item_count"], 0);
        assert_eq!(resp.data["summary"], "");
    }

    #[tokio::test]
    async fn file_items_keep_their_path_as_heading() {
        let t = tool_with(vec![ContextItem::from_file("src/main.rs", "fn main() {}")]);
        let resp = run(&t, json!({})).await;
        let summary = resp.data["summary"].as_str().unwrap();
        assert!(summary.contains("## src/main.rs"));
        assert!(summary.contains("fn main()"));
    }

    #[tokio::test]
    async fn long_items_truncate_to_budget() {
        let long = "x".repeat(1000);
        let t = tool_with(vec![ContextItem {
            content: long,
            file_path: None,
            source_command: Some("cat big.txt".into()),
        }]);
        let resp = run(&t, json!({"item_budget": 100})).await;
        let summary = resp.data["summary"].as_str().unwrap();
        assert!(summary.contains("$ cat big.txt"));
        assert!(summary.contains('…'));
        assert!(summary.len() < 300);
    }

    #[tokio::test]
    async fn description_reports_item_count() {
        let t = tool_with(vec![
            ContextItem::from_file("a", "1"),
            ContextItem::from_file("b", "2"),
        ]);
        let resp = run(&t, json!({})).await;
        assert!(resp.description.contains("2 context items"));
    }
}
