//! Google Gemini client (request/response; streaming is synthesized by the
//! trait default).

use async_trait::async_trait;
use serde_json::json;

use super::{ChatProvider, ProviderError, resolve_key, status_error};
use crate::prompt::ProviderRequest;

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
}

impl GeminiProvider {
    pub fn new(api_key_env: &str) -> Self {
        Self::with_base_url("https://generativelanguage.googleapis.com/v1beta", api_key_env)
    }

    /// Overridable base URL; used by tests.
    pub fn with_base_url(base_url: &str, api_key_env: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn id(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let key = resolve_key(&self.api_key_env)?;
        let body = json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
                "topP": request.top_p,
            }
        });
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, request.model
            ))
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, detail));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| ProviderError::Malformed("response had no candidates".into()))?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(ProviderError::Malformed("candidate had no text parts".into()));
        }
        Ok(text)
    }
}
