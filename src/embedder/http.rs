//! OpenAI-compatible HTTP embedding client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedError, check_input};
use crate::retry::RetryPolicy;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding client for any endpoint speaking the OpenAI `/embeddings`
/// wire shape (OpenAI itself, or local inference servers).
///
/// Rate-limit responses are retried internally with bounded backoff;
/// transport and auth failures propagate immediately so ingest can mark
/// the document failed without waiting out a retry ladder.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpEmbedder {
    /// Creates a client against `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `api_key_env` names the environment variable holding the bearer
    /// token; `None` for unauthenticated local endpoints.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        api_key_env: Option<&str>,
    ) -> Self {
        let api_key = api_key_env.and_then(|var| dotenvy::var(var).ok());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the rate-limit retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|err| EmbedError::ProviderUnavailable(err.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(EmbedError::RateLimited),
            StatusCode::BAD_REQUEST => {
                let detail = response.text().await.unwrap_or_default();
                return Err(EmbedError::InvalidInput(detail));
            }
            status if !status.is_success() => {
                return Err(EmbedError::ProviderUnavailable(format!(
                    "embedding endpoint returned {status}"
                )));
            }
            _ => {}
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbedError::ProviderUnavailable(err.to_string()))?;

        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        let vectors: Vec<Vec<f32>> = rows.into_iter().map(|row| row.embedding).collect();

        if vectors.len() != texts.len() {
            return Err(EmbedError::ProviderUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(EmbedError::ProviderUnavailable(format!(
                    "provider returned dimension {}, configured {}",
                    v.len(),
                    self.dimension
                )));
            }
        }
        Ok(vectors)
    }

    async fn request_with_backoff(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 1;
        loop {
            match self.request_batch(texts).await {
                Err(EmbedError::RateLimited) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "embedding rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        check_input(text)?;
        let batch = [text.to_string()];
        let mut vectors = self.request_with_backoff(&batch).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            check_input(text)?;
        }
        self.request_with_backoff(texts).await
    }
}
