//! Extraction through an OpenAI compatible chat completions API.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use harvest_crawler::text::visible_text;
use harvest_crawler::{ExtractionStrategy, PageLocation};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prompts;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Which model to talk to, as `<vendor>/<model>` (e.g. `openai/gpt-4o`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl LlmConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_token: None,
            base_url: None,
        }
    }

    pub fn with_api_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(api_token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn vendor(&self) -> &str {
        self.provider
            .split_once('/')
            .map_or("openai", |(vendor, _)| vendor)
    }

    pub fn model(&self) -> &str {
        self.provider
            .split_once('/')
            .map_or(self.provider.as_str(), |(_, model)| model)
    }

    fn base_url(&self) -> Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.vendor() {
            "openai" => Ok(OPENAI_BASE_URL.to_string()),
            "ollama" => Ok(OLLAMA_BASE_URL.to_string()),
            "groq" => Ok(GROQ_BASE_URL.to_string()),
            vendor => bail!("Unknown provider {vendor:?}, a base URL is required"),
        }
    }
}

/// Sampling options and headers sent along with each completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Minimal chat completions client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_token.is_none() && config.vendor() != "ollama" {
            bail!("API token is required for {}", config.provider);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url()?,
            api_token: config.api_token.clone(),
            model: config.model().to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the content of the first choice.
    pub async fn complete(&self, messages: &[Message], args: &ExtraArgs) -> Result<String> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: args.temperature,
            top_p: args.top_p,
            max_tokens: args.max_tokens,
        };

        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(token) = &self.api_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in &args.extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Chat completion request to {} failed", self.base_url))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            log::warn!("LLM API error {status}: {error_text}");
            bail!("LLM API error {status}: {error_text}");
        }

        let chat: ChatResponse = resp.json().await.context("Malformed chat completion")?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No completion returned by {}", self.model))?;

        log::debug!(
            "Chat completion with {} took {}ms",
            self.model,
            start.elapsed().as_millis()
        );

        Ok(content)
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let Some(rest) = reply.strip_prefix("```") else {
        return reply;
    };
    let body = match rest.split_once('\n') {
        Some((lang, body)) if !lang.trim_start().starts_with(['{', '[']) => body,
        _ => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a model reply into JSON, tolerating code fences and surrounding prose.
pub fn parse_json_reply(reply: &str) -> Result<Value> {
    let body = strip_code_fence(reply.trim());
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }
    let start = body.find(['[', '{']);
    let end = body.rfind([']', '}']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
            .with_context(|| format!("LLM reply is not JSON: {body}")),
        _ => bail!("LLM reply is not JSON: {body}"),
    }
}

/// Extracts data with a language model, following a JSON schema and an instruction.
#[derive(Debug, Clone)]
pub struct LlmExtractionStrategy {
    client: LlmClient,
    schema: Option<Value>,
    instruction: String,
    extra_args: ExtraArgs,
    max_content_chars: usize,
}

impl LlmExtractionStrategy {
    pub fn new(config: &LlmConfig, instruction: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(LlmClient::new(config)?, instruction))
    }

    pub fn with_client(client: LlmClient, instruction: impl Into<String>) -> Self {
        Self {
            client,
            schema: None,
            instruction: instruction.into(),
            extra_args: ExtraArgs::default(),
            max_content_chars: 60_000,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_extra_args(mut self, extra_args: ExtraArgs) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }
}

#[async_trait]
impl ExtractionStrategy for LlmExtractionStrategy {
    async fn extract(&self, page: &str, location: &PageLocation) -> Result<Value> {
        let content: String = visible_text(page)
            .chars()
            .take(self.max_content_chars)
            .collect();
        let messages = [
            Message::system(prompts::EXTRACTION_SYSTEM),
            Message::user(prompts::extraction_request(
                &location.to_string(),
                &content,
                &self.instruction,
                self.schema.as_ref(),
            )),
        ];

        let reply = self.client.complete(&messages, &self.extra_args).await?;
        match parse_json_reply(&reply)? {
            Value::Array(items) => Ok(Value::Array(items)),
            other => Ok(Value::Array(vec![other])),
        }
    }
}
