//! Anthropic Messages API client.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;

use super::{ChatProvider, ProviderError, SseBuffer, resolve_key, status_error};
use crate::prompt::ProviderRequest;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
    messages: [Turn<'a>; 1],
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    content: &'a str,
}

impl AnthropicProvider {
    pub fn new(api_key_env: &str) -> Self {
        Self::with_base_url("https://api.anthropic.com", api_key_env)
    }

    /// Overridable base URL; used by tests.
    pub fn with_base_url(base_url: &str, api_key_env: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream,
            messages: [Turn {
                role: "user",
                content: &request.prompt,
            }],
        };
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", resolve_key(&self.api_key_env)?)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, detail));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn id(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let response = self.send(request, false).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("response had no text content".into()))
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        tokens: flume::Sender<String>,
    ) -> Result<String, ProviderError> {
        let response = self.send(request, true).await?;
        let mut body = response.bytes_stream();
        let mut sse = SseBuffer::new();
        let mut full = String::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| ProviderError::Unavailable(err.to_string()))?;
            for payload in sse.push(&chunk) {
                let value: serde_json::Value = serde_json::from_str(&payload)
                    .map_err(|err| ProviderError::Malformed(err.to_string()))?;
                match value["type"].as_str() {
                    Some("content_block_delta") => {
                        if let Some(text) = value["delta"]["text"].as_str()
                            && !text.is_empty()
                        {
                            full.push_str(text);
                            let _ = tokens.send_async(text.to_string()).await;
                        }
                    }
                    Some("message_stop") => return Ok(full),
                    _ => {}
                }
            }
        }
        Ok(full)
    }
}
