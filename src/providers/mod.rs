//! Chat completion providers and the dispatch layer in front of them.
//!
//! Every provider implements [`ChatProvider`]: a request/response
//! `complete` and a `stream` that relays tokens through a channel as they
//! arrive. Streaming providers (OpenAI-compatible, Anthropic) parse SSE off
//! `reqwest` byte streams; non-streaming providers (Gemini) rely on the
//! trait's default `stream`, which synthesizes a single token event from
//! `complete`. [`ProviderDispatcher`] sits on top and owns retry, timeout,
//! and fallback policy; the provider it drives is resolved per request
//! through a [`ProviderRegistry`] from the profile's configuration.

pub mod anthropic;
pub mod dispatcher;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::profile::ProviderConfig;
use crate::prompt::ProviderRequest;

pub use anthropic::AnthropicProvider;
pub use dispatcher::{DispatchError, ProviderDispatcher};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Errors surfaced by chat providers.
#[derive(Clone, Debug, Error)]
pub enum ProviderError {
    /// Network failure or 5xx; retryable.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Quota exhaustion (429); retryable with backoff.
    #[error("provider rate limited")]
    RateLimited,
    /// Auth failure or any other 4xx; never retried.
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    /// Response body did not match the provider's documented shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the dispatcher may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited)
    }
}

/// A chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable identifier matching [`ProviderConfig::id`].
    fn id(&self) -> &'static str;

    /// One-shot completion; returns the full response text.
    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError>;

    /// Streams response tokens into `tokens` as they arrive and returns the
    /// full accumulated text.
    ///
    /// The default implementation wraps [`complete`](Self::complete) and
    /// emits the whole answer as one token, which is how request/response
    /// providers join the streaming interface.
    async fn stream(
        &self,
        request: &ProviderRequest,
        tokens: flume::Sender<String>,
    ) -> Result<String, ProviderError> {
        let text = self.complete(request).await?;
        // Receiver may already be gone; the text still goes back to the caller.
        let _ = tokens.send_async(text.clone()).await;
        Ok(text)
    }
}

/// Selects the chat client for a profile's provider configuration.
///
/// Looked up per request from the profile snapshot, so editing a profile's
/// provider takes effect on the next message without restarting sessions.
pub trait ProviderRegistry: Send + Sync {
    fn provider_for(&self, config: &ProviderConfig) -> Arc<dyn ChatProvider>;
}

/// Default registry backed by [`build_provider`]: constructs the HTTP client
/// matching the config on every lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpProviderRegistry;

impl ProviderRegistry for HttpProviderRegistry {
    fn provider_for(&self, config: &ProviderConfig) -> Arc<dyn ChatProvider> {
        build_provider(config)
    }
}

/// Builds the client for a validated [`ProviderConfig`].
pub fn build_provider(config: &ProviderConfig) -> Arc<dyn ChatProvider> {
    match config {
        ProviderConfig::OpenAi { api_key_env } => Arc::new(OpenAiProvider::openai(api_key_env)),
        ProviderConfig::Anthropic { api_key_env } => Arc::new(AnthropicProvider::new(api_key_env)),
        ProviderConfig::Gemini { api_key_env } => Arc::new(GeminiProvider::new(api_key_env)),
        ProviderConfig::CustomHttp {
            base_url,
            api_key_env,
        } => Arc::new(OpenAiProvider::custom(base_url, api_key_env.as_deref())),
    }
}

/// Resolves an API key named by environment variable.
pub(crate) fn resolve_key(env_var: &str) -> Result<String, ProviderError> {
    dotenvy::var(env_var)
        .map_err(|_| ProviderError::Rejected(format!("api key variable {env_var} is not set")))
}

/// Maps a non-success HTTP status to the error taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, detail: String) -> ProviderError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited
    } else if status.is_client_error() {
        ProviderError::Rejected(format!("{status}: {detail}"))
    } else {
        ProviderError::Unavailable(format!("{status}: {detail}"))
    }
}

/// Incremental server-sent-events scanner over raw byte chunks.
///
/// Buffers until a full line is available so multi-byte UTF-8 sequences and
/// `data:` payloads split across network reads are reassembled correctly.
pub(crate) struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feeds raw bytes; returns the `data:` payloads of every completed line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}
