// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use odin_planner::ContentExtractor;

use crate::tool::{Tool, ToolCall, ToolError, ToolResponse};

const DEFAULT_MAX_CHARS: usize = 50_000;

/// Fetches a URL, converts HTML to readable text, then hands the content to
/// the cheap extractor model with the caller's prompt.
pub struct WebFetchTool {
    extractor: Arc<dyn ContentExtractor>,
    pub max_chars: usize,
}

impl WebFetchTool {
    pub fn new(extractor: Arc<dyn ContentExtractor>, max_chars: usize) -> Self {
        Self {
            extractor,
            max_chars: if max_chars == 0 {
                DEFAULT_MAX_CHARS
            } else {
                max_chars
            },
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL, convert HTML to readable text, and \
         extract/transform it according to the given prompt.\n\
         URL must be fully-formed http/https. No authentication support. \
         Content is capped (default 50,000 characters) before extraction.\n\
         Use for documentation, references, and other web resources."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                },
                "prompt": {
                    "type": "string",
                    "description": "What to extract or how to transform the fetched content"
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters fetched before extraction"
                }
            },
            "required": ["url", "prompt"],
            "additionalProperties": false
        })
    }

    async fn pre_hook(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let url = call
            .args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("missing required parameter 'url'".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::Validation(format!(
                "url must be http or https, got '{url}'"
            )));
        }
        if call.args.get("prompt").and_then(|v| v.as_str()).is_none() {
            return Err(ToolError::Validation(
                "missing required parameter 'prompt'".into(),
            ));
        }
        Ok(call.args.clone())
    }

    async fn execute(&self, _call: &ToolCall, prepared: Value) -> Result<Value, ToolError> {
        let url = prepared["url"]
            .as_str()
            .ok_or_else(|| ToolError::Invariant("prepared input lost 'url'".into()))?;
        let prompt = prepared["prompt"].as_str().unwrap_or_default();
        let max_chars = prepared
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.max_chars);

        debug!(url = %url, "web_fetch tool");

        let content = fetch_url(url, max_chars)
            .await
            .map_err(|e| ToolError::Transport(format!("fetch {url}: {e}")))?;

        let extracted = self
            .extractor
            .extract(prompt, &content)
            .await
            .map_err(|e| ToolError::Transport(format!("extractor: {e}")))?;

        Ok(json!({
            "url": url,
            "fetched_chars": content.len(),
            "output": extracted,
        }))
    }

    async fn post_hook(&self, _call: &ToolCall, raw: Value) -> Result<ToolResponse, ToolError> {
        let url = raw["url"].as_str().unwrap_or("?").to_string();
        Ok(ToolResponse::new(raw, format!("fetched {url}")))
    }
}

async fn fetch_url(url: &str, max_chars: usize) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("odin-agent/0.1")
        .build()?;

    let response = client.get(url).send().await?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.len() > max_chars {
        let cut: String = content.chars().take(max_chars).collect();
        Ok(format!(
            "{cut}...[truncated at {max_chars} chars; total {} chars]",
            content.len()
        ))
    } else {
        Ok(content)
    }
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
