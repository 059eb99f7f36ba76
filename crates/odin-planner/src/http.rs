// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use odin_config::PlannerSettings;

use crate::protocol::{PlannerInput, PlannerOutput, SufficiencyRequest, SufficiencyVerdict};
use crate::provider::{ContentExtractor, PlannerProvider, SufficiencyValidator};

const REQUEST_TIMEOUT_SECS: u64 = 120;

fn build_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent("odin-agent/0.1")
        .build()?)
}

fn resolve_api_key(settings: &PlannerSettings) -> Option<String> {
    settings
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
}

async fn post_json<B: Serialize, R: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
) -> anyhow::Result<R> {
    let mut req = client.post(url).json(body);
    if let Some(key) = api_key {
        req = req.bearer_auth(key);
    }
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("{url} returned {status}: {text}");
    }
    Ok(response.json::<R>().await?)
}

/// Planner client speaking the `POST {base_url}/v1/plan` protocol.
pub struct HttpPlanner {
    client: reqwest::Client,
    settings: PlannerSettings,
    api_key: Option<String>,
}

impl HttpPlanner {
    pub fn new(settings: PlannerSettings) -> anyhow::Result<Self> {
        let api_key = resolve_api_key(&settings);
        Ok(Self {
            client: build_client()?,
            settings,
            api_key,
        })
    }
}

#[async_trait]
impl PlannerProvider for HttpPlanner {
    fn name(&self) -> &str {
        &self.settings.planner_model
    }

    async fn plan(&self, input: &PlannerInput) -> anyhow::Result<PlannerOutput> {
        let url = format!("{}/v1/plan", self.settings.base_url.trim_end_matches('/'));
        debug!(url = %url, tools = input.available_tools.len(), "planner request");
        #[derive(Serialize)]
        struct Body<'a> {
            model: &'a str,
            #[serde(flatten)]
            input: &'a PlannerInput,
        }
        post_json(
            &self.client,
            &url,
            self.api_key.as_deref(),
            &Body {
                model: &self.settings.planner_model,
                input,
            },
        )
        .await
    }
}

/// Sufficiency-validator client speaking `POST {base_url}/v1/validate`.
pub struct HttpValidator {
    client: reqwest::Client,
    settings: PlannerSettings,
    api_key: Option<String>,
}

impl HttpValidator {
    pub fn new(settings: PlannerSettings) -> anyhow::Result<Self> {
        let api_key = resolve_api_key(&settings);
        Ok(Self {
            client: build_client()?,
            settings,
            api_key,
        })
    }
}

#[async_trait]
impl SufficiencyValidator for HttpValidator {
    async fn validate(&self, request: &SufficiencyRequest) -> anyhow::Result<SufficiencyVerdict> {
        let url = format!("{}/v1/validate", self.settings.base_url.trim_end_matches('/'));
        debug!(url = %url, file = %request.file_path, "sufficiency request");
        #[derive(Serialize)]
        struct Body<'a> {
            model: &'a str,
            #[serde(flatten)]
            request: &'a SufficiencyRequest,
        }
        post_json(
            &self.client,
            &url,
            self.api_key.as_deref(),
            &Body {
                model: &self.settings.validator_model,
                request,
            },
        )
        .await
    }
}

/// Content-extractor client speaking `POST {base_url}/v1/extract`.
/// Backs web_fetch's prompt-driven extraction step.
pub struct HttpExtractor {
    client: reqwest::Client,
    settings: PlannerSettings,
    api_key: Option<String>,
}

impl HttpExtractor {
    pub fn new(settings: PlannerSettings) -> anyhow::Result<Self> {
        let api_key = resolve_api_key(&settings);
        Ok(Self {
            client: build_client()?,
            settings,
            api_key,
        })
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, prompt: &str, content: &str) -> anyhow::Result<String> {
        let url = format!("{}/v1/extract", self.settings.base_url.trim_end_matches('/'));
        debug!(url = %url, prompt_len = prompt.len(), "extract request");
        #[derive(Serialize)]
        struct Body<'a> {
            model: &'a str,
            prompt: &'a str,
            content: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Reply {
            output: String,
        }
        let reply: Reply = post_json(
            &self.client,
            &url,
            self.api_key.as_deref(),
            &Body {
                model: &self.settings.validator_model,
                prompt,
                content,
            },
        )
        .await?;
        Ok(reply.output)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
