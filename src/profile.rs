//! Profiles bundle a prompt template, a provider/model choice, and retrieval
//! settings.
//!
//! Validation happens at save/load time, never on the query path: a profile
//! that reaches the retriever or dispatcher is already known to be coherent
//! (overlap smaller than chunk size, placeholders present, provider variant
//! fully specified).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProfileId;

/// Placeholder substituted with the retrieved context in a prompt template.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
/// Placeholder substituted with the user's question in a prompt template.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Configuration errors rejected when a profile is saved or loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk_size must be positive, got {0}")]
    ChunkSizeZero(usize),
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("max_context_chunks must be at least 1")]
    NoContextBudget,
    #[error("similarity_threshold {0} is outside [-1, 1]")]
    ThresholdOutOfRange(f32),
    #[error("prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("provider config invalid: {0}")]
    Provider(String),
    #[error("embedding dimension mismatch: index declares {expected}, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Retrieval and generation settings for a profile.
///
/// Construct via [`ProfileSettings::validated`] (or validate with
/// [`ProfileSettings::validate`] after deserializing) so that configuration
/// errors surface at save time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_chunks: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub similarity_threshold: f32,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_context_chunks: 5,
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
            similarity_threshold: 0.7,
        }
    }
}

impl ProfileSettings {
    /// Validates the settings, returning them unchanged on success.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Checks every invariant the query and ingest paths rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSizeZero(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        if self.max_context_chunks == 0 {
            return Err(ConfigError::NoContextBudget);
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.similarity_threshold));
        }
        Ok(())
    }
}

/// Closed set of supported AI providers, one variant per kind.
///
/// Each variant carries exactly the fields that kind requires; there is no
/// untyped key/value fallback. API keys are referenced by environment
/// variable name and resolved lazily at call time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    OpenAi {
        /// Environment variable holding the API key.
        api_key_env: String,
    },
    Anthropic {
        api_key_env: String,
    },
    Gemini {
        api_key_env: String,
    },
    /// Any OpenAI-compatible HTTP endpoint (local inference servers etc.).
    CustomHttp {
        base_url: String,
        /// Optional bearer token environment variable.
        api_key_env: Option<String>,
    },
}

impl ProviderConfig {
    /// Stable identifier used to route dispatch to the matching client.
    pub fn id(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAi { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::Gemini { .. } => "gemini",
            ProviderConfig::CustomHttp { .. } => "custom",
        }
    }

    /// Validates variant-specific fields at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ProviderConfig::OpenAi { api_key_env }
            | ProviderConfig::Anthropic { api_key_env }
            | ProviderConfig::Gemini { api_key_env } => {
                if api_key_env.trim().is_empty() {
                    return Err(ConfigError::Provider(format!(
                        "{}: api_key_env must not be empty",
                        self.id()
                    )));
                }
            }
            ProviderConfig::CustomHttp { base_url, .. } => {
                url::Url::parse(base_url).map_err(|err| {
                    ConfigError::Provider(format!("custom: invalid base_url '{base_url}': {err}"))
                })?;
            }
        }
        Ok(())
    }

    /// Approximate context window, in characters, for prompt budgeting.
    ///
    /// Deliberately conservative; the assembler subtracts the completion
    /// budget (`max_tokens`) from this before packing context chunks.
    pub fn context_window_chars(&self) -> usize {
        match self {
            ProviderConfig::OpenAi { .. } => 128_000 * 4,
            ProviderConfig::Anthropic { .. } => 200_000 * 4,
            ProviderConfig::Gemini { .. } => 128_000 * 4,
            ProviderConfig::CustomHttp { .. } => 8_000 * 4,
        }
    }
}

/// A named assistant configuration owning documents and retrieval settings.
///
/// Profiles are created and edited by the management layer; an in-flight
/// query works against the snapshot it fetched at dispatch time, so edits
/// never affect running requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    /// Template containing `{context}` and `{question}` placeholders.
    pub prompt_template: String,
    pub provider: ProviderConfig,
    pub model: String,
    pub settings: ProfileSettings,
}

impl Profile {
    /// Builds and validates a profile in one step.
    pub fn new(
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        provider: ProviderConfig,
        model: impl Into<String>,
        settings: ProfileSettings,
    ) -> Result<Self, ConfigError> {
        let profile = Self {
            id: ProfileId::new(),
            name: name.into(),
            prompt_template: prompt_template.into(),
            provider,
            model: model.into(),
            settings,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Full save-time validation: settings, template placeholders, provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if !self.prompt_template.contains(CONTEXT_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(CONTEXT_PLACEHOLDER));
        }
        if !self.prompt_template.contains(QUESTION_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(QUESTION_PLACEHOLDER));
        }
        self.provider.validate()?;
        Ok(())
    }
}
