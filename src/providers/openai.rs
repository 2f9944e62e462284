//! OpenAI-compatible chat client, used for OpenAI itself and any custom
//! endpoint speaking the same `/chat/completions` wire shape.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatProvider, ProviderError, SseBuffer, resolve_key, status_error};
use crate::prompt::ProviderRequest;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key_env: Option<String>,
    id: &'static str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl OpenAiProvider {
    /// Client for api.openai.com.
    pub fn openai(api_key_env: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key_env: Some(api_key_env.to_string()),
            id: "openai",
        }
    }

    /// Client for a custom OpenAI-compatible endpoint (local inference
    /// servers, proxies).
    pub fn custom(base_url: &str, api_key_env: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env: api_key_env.map(str::to_string),
            id: "custom",
        }
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = ChatBody {
            model: &request.model,
            messages: [ChatTurn {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stream,
        };
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(env_var) = &self.api_key_env {
            req = req.bearer_auth(resolve_key(env_var)?);
        }
        let response = req
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
impl ChatProvider for OpenAiProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let response = self.send(request, false).await?;
        let parsed: Completion = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("response had no choices".into()))
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
                if payload == "[DONE]" {
                    return Ok(full);
                }
                let value: serde_json::Value = serde_json::from_str(&payload)
                    .map_err(|err| ProviderError::Malformed(err.to_string()))?;
                if let Some(delta) = value["choices"][0]["delta"]["content"].as_str()
                    && !delta.is_empty()
                {
                    full.push_str(delta);
                    let _ = tokens.send_async(delta.to_string()).await;
                }
            }
        }
        Ok(full)
    }
}
