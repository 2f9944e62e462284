//! Text embedding providers.
//!
//! The [`Embedder`] trait is the contract every embedding backend must
//! satisfy: a fixed output dimension, single and batch embedding, and the
//! three-way error taxonomy the ingest and query paths react to. The HTTP
//! implementation speaks the OpenAI-compatible `/embeddings` wire shape;
//! [`MockEmbedder`] provides deterministic vectors for tests.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpEmbedder;
pub use mock::MockEmbedder;

/// Upper bound on a single embedding input; anything larger is rejected
/// before the network call.
pub const MAX_INPUT_CHARS: usize = 32_000;

/// Errors surfaced by embedding providers.
#[derive(Clone, Debug, Error)]
pub enum EmbedError {
    /// Network, transport, or authentication failure. Not retryable here;
    /// callers decide whether to fail the document or the request.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Quota exhaustion; retryable with backoff.
    #[error("embedding provider rate limited")]
    RateLimited,
    /// Empty or oversized input; the caller sent something unusable.
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),
}

/// Converts text into fixed-dimension vectors.
///
/// The dimension is fixed per provider configuration and must match the
/// dimension the vector index was declared with; a mismatch is a fatal
/// configuration error surfaced at ingest time, never silently padded.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The output dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embeds a batch of texts, preserving order.
    ///
    /// The default implementation loops; providers with a batch endpoint
    /// override this for throughput.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Validates an input before it is sent to any provider.
pub(crate) fn check_input(text: &str) -> Result<(), EmbedError> {
    if text.trim().is_empty() {
        return Err(EmbedError::InvalidInput("empty text".into()));
    }
    let chars = text.chars().count();
    if chars > MAX_INPUT_CHARS {
        return Err(EmbedError::InvalidInput(format!(
            "input of {chars} chars exceeds limit of {MAX_INPUT_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_invalid() {
        assert!(matches!(
            check_input("   "),
            Err(EmbedError::InvalidInput(_))
        ));
    }

    #[test]
    fn oversized_input_is_invalid() {
        let big = "a".repeat(MAX_INPUT_CHARS + 1);
        assert!(matches!(
            check_input(&big),
            Err(EmbedError::InvalidInput(_))
        ));
    }

    #[test]
    fn normal_input_passes() {
        check_input("a perfectly reasonable sentence").unwrap();
    }
}
