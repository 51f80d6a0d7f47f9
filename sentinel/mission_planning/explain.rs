use std::{env, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::PlanningError, model::TaskRecommendation};

/// What an explanation provider is asked to summarize.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    /// Mission being planned.
    pub mission_id: &'a str,
    /// Operator intent, if given.
    pub operator_intent: Option<&'a str>,
    /// Selected tasks, best first.
    pub tasks: &'a [TaskRecommendation],
}

/// Produces a human-readable rationale for a selected task list.
///
/// `Ok(None)` means the provider chose not to answer (for example, it is switched off).
#[async_trait]
pub trait ExplanationProvider: Send + Sync {
    /// Summarizes the plan.
    async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<Option<String>, PlanningError>;
}

/// Settings for the chat-completions explainer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExplainerConfig {
    /// Master switch.
    #[serde(default)]
    pub enabled: bool,
    /// API root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Completion budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl ExplainerConfig {
    /// Loads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading explainer config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Explainer backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsExplainer {
    client: Client,
    config: ExplainerConfig,
    api_key: Option<String>,
}

impl ChatCompletionsExplainer {
    /// Creates an explainer, reading the API key from `config.api_key_env`.
    pub fn new(config: ExplainerConfig) -> Result<Self, PlanningError> {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let client = Client::builder()
            .user_agent("sentinel-mission-planning/0.1")
            .timeout(config.timeout())
            .build()
            .map_err(|err| PlanningError::Explanation(err.to_string()))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Overrides the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// True when enabled and a key is available.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.config.enabled && self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ExplanationProvider for ChatCompletionsExplainer {
    async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<Option<String>, PlanningError> {
        let Some(key) = self.api_key.as_deref().filter(|_| self.config.enabled) else {
            return Ok(None);
        };
        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": render_prompt(request)?}],
            "max_tokens": self.config.max_tokens,
        });
        let body: Value = self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| PlanningError::Explanation(err.to_string()))?
            .json()
            .await
            .map_err(|err| PlanningError::Explanation(err.to_string()))?;
        completion_text(&body).map(Some)
    }
}

/// Operator-facing prompt for `request`.
pub fn render_prompt(request: &ExplanationRequest<'_>) -> Result<String, PlanningError> {
    let tasks = serde_json::to_string(request.tasks)
        .map_err(|err| PlanningError::Explanation(err.to_string()))?;
    Ok(format!(
        "You are assisting a mission operator. Summarize the tasking plan.\n\
         Be concise. Explain why these tasks are prioritized. Mention tradeoffs if relevant.\n\n\
         Mission: {}\nIntent: {}\nTasks: {tasks}\n",
        request.mission_id,
        request.operator_intent.unwrap_or("not provided"),
    ))
}

fn completion_text(body: &Value) -> Result<String, PlanningError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| PlanningError::Explanation("completion response has no message content".into()))
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}

const fn default_max_tokens() -> u32 {
    350
}

const fn default_timeout_ms() -> u64 {
    20_000
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
