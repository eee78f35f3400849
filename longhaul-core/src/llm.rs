//! Text-generation client for the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::json;

use crate::config::LlmConfig;
use crate::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LLM completion interface used by the iteration processor.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one user prompt and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for `POST {endpoint}/v1/messages`.
pub struct AnthropicClient {
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
    http: reqwest::Client,
}

impl AnthropicClient {
    /// Build a client with an explicit API key.
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| Error::Config(format!("invalid api key header: {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            http,
        })
    }

    /// Build a client, resolving the key from config or `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(config, &api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.endpoint);

        let resp = self
            .http
            .post(url)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| Error::Llm(format!("claude request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("claude read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "claude returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        parse_message_text(&body)
    }
}

/// Pull `content[0].text` out of a Messages API response body.
fn parse_message_text(body: &str) -> Result<String> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::Llm(format!("claude response is not JSON: {e}")))?;
    json.get("content")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("text"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Llm("claude response missing content[0].text".to_string()))
}
