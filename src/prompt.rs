//! Prompt assembly: template plus retrieved context plus question.

use tracing::debug;

use crate::message::ContextChunk;
use crate::profile::{CONTEXT_PLACEHOLDER, Profile, QUESTION_PLACEHOLDER};
use crate::types::ScoredChunk;

/// Marker rendered into the context slot when retrieval found nothing; the
/// model is told explicitly rather than handed an empty string.
pub const NO_CONTEXT_MARKER: &str = "No relevant context found.";

const BLOCK_SEPARATOR: &str = "\n\n";

/// A fully rendered request ready for a chat provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

/// The assembled prompt plus the provenance of every chunk that made it in.
#[derive(Clone, Debug)]
pub struct AssembledPrompt {
    pub request: ProviderRequest,
    /// Chunks actually included, in ranked order; mirrors what the final
    /// answer will cite.
    pub context: Vec<ContextChunk>,
}

/// Renders a profile's template with retrieved chunks and the question.
///
/// The prompt must fit the provider's context window with headroom for the
/// completion, so chunks are dropped lowest-similarity-first when the budget
/// is tight. The question itself is never dropped.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Assembles the final prompt for `question` under `profile`.
    ///
    /// `chunks` must already be ranked (descending similarity, ties by
    /// ascending chunk index), as the retriever returns them.
    pub fn assemble(profile: &Profile, question: &str, chunks: &[ScoredChunk]) -> AssembledPrompt {
        let budget = Self::context_budget(profile, question);
        let (blocks, context) = Self::pack_chunks(chunks, budget);

        let context_text = if blocks.is_empty() {
            NO_CONTEXT_MARKER.to_string()
        } else {
            blocks.join(BLOCK_SEPARATOR)
        };

        let prompt = profile
            .prompt_template
            .replace(CONTEXT_PLACEHOLDER, &context_text)
            .replace(QUESTION_PLACEHOLDER, question);

        debug!(
            profile_id = %profile.id,
            offered = chunks.len(),
            included = context.len(),
            prompt_chars = prompt.chars().count(),
            "prompt assembled"
        );

        AssembledPrompt {
            request: ProviderRequest {
                prompt,
                model: profile.model.clone(),
                temperature: profile.settings.temperature,
                max_tokens: profile.settings.max_tokens,
                top_p: profile.settings.top_p,
            },
            context,
        }
    }

    /// Characters available for context blocks after reserving space for the
    /// completion, the template scaffolding, and the question.
    fn context_budget(profile: &Profile, question: &str) -> usize {
        // Rough chars-per-token factor for the completion reservation.
        let completion_reserve = profile.settings.max_tokens as usize * 4;
        let scaffolding = profile
            .prompt_template
            .replace(CONTEXT_PLACEHOLDER, "")
            .replace(QUESTION_PLACEHOLDER, "")
            .chars()
            .count()
            + question.chars().count();
        profile
            .provider
            .context_window_chars()
            .saturating_sub(completion_reserve)
            .saturating_sub(scaffolding)
    }

    /// Packs ranked chunks into the budget, best matches first. Because the
    /// input is ranked, truncating from the tail drops the weakest match
    /// (ties: the highest chunk index) first.
    fn pack_chunks(chunks: &[ScoredChunk], budget: usize) -> (Vec<String>, Vec<ContextChunk>) {
        let mut blocks = Vec::new();
        let mut context = Vec::new();
        let mut used = 0usize;

        for scored in chunks {
            let block = format_block(scored);
            let separator = if blocks.is_empty() {
                0
            } else {
                BLOCK_SEPARATOR.len()
            };
            let cost = block.chars().count() + separator;
            if used + cost > budget {
                break;
            }
            used += cost;
            blocks.push(block);
            context.push(ContextChunk {
                chunk_id: scored.chunk.id,
                document_id: scored.chunk.document_id,
                source: scored.chunk.source().unwrap_or("unknown").to_string(),
                chunk_index: scored.chunk.chunk_index,
                similarity: scored.similarity,
            });
        }
        (blocks, context)
    }
}

fn format_block(scored: &ScoredChunk) -> String {
    format!(
        "Document: {}\nContent: {}",
        scored.chunk.source().unwrap_or("unknown"),
        scored.chunk.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkRecord;
    use crate::profile::{ProfileSettings, ProviderConfig};
    use crate::types::{DocumentId, ProfileId};

    fn profile() -> Profile {
        Profile::new(
            "assembler-test",
            "Context:\n{context}\n\nQuestion: {question}",
            ProviderConfig::CustomHttp {
                base_url: "http://localhost:11434/v1".into(),
                api_key_env: None,
            },
            "test-model",
            ProfileSettings::default(),
        )
        .unwrap()
    }

    fn scored(profile_id: ProfileId, chunk_index: usize, content: &str, similarity: f32) -> ScoredChunk {
        let doc = DocumentId::new();
        ScoredChunk {
            chunk: ChunkRecord::new(doc, profile_id, chunk_index, content)
                .with_metadata(serde_json::json!({"source": "guide.md"}))
                .with_embedding(vec![0.0]),
            similarity,
        }
    }

    #[test]
    fn renders_document_blocks_in_ranked_order() {
        let profile = profile();
        let chunks = vec![
            scored(profile.id, 2, "best match", 0.9),
            scored(profile.id, 0, "second match", 0.8),
        ];
        let assembled = PromptAssembler::assemble(&profile, "what now?", &chunks);

        let prompt = &assembled.request.prompt;
        assert!(prompt.contains("Document: guide.md\nContent: best match"));
        assert!(prompt.contains("Document: guide.md\nContent: second match"));
        assert!(
            prompt.find("best match").unwrap() < prompt.find("second match").unwrap(),
            "ranked order must be preserved"
        );
        assert!(prompt.contains("Question: what now?"));
        assert_eq!(assembled.context.len(), 2);
        assert_eq!(assembled.context[0].chunk_index, 2);
    }

    #[test]
    fn empty_retrieval_renders_explicit_marker() {
        let profile = profile();
        let assembled = PromptAssembler::assemble(&profile, "anything?", &[]);
        assert!(assembled.request.prompt.contains(NO_CONTEXT_MARKER));
        assert!(assembled.context.is_empty());
    }

    #[test]
    fn tight_budget_drops_weakest_chunks_but_keeps_question() {
        let mut profile = profile();
        // Custom provider window is 32k chars; a huge completion reserve
        // leaves room for only a couple of small blocks.
        profile.settings.max_tokens = 7_900;

        let chunks = vec![
            scored(profile.id, 0, &"a".repeat(150), 0.9),
            scored(profile.id, 1, &"b".repeat(150), 0.8),
            scored(profile.id, 2, &"c".repeat(150), 0.7),
        ];
        let assembled = PromptAssembler::assemble(&profile, "the question survives", &chunks);

        assert!(assembled.context.len() < 3);
        assert_eq!(assembled.context[0].chunk_index, 0);
        assert!(assembled.request.prompt.contains("the question survives"));
    }

    #[test]
    fn request_carries_profile_generation_settings() {
        let mut profile = profile();
        profile.settings.temperature = 0.2;
        profile.settings.max_tokens = 512;
        profile.settings.top_p = 0.9;

        let assembled = PromptAssembler::assemble(&profile, "q", &[]);
        assert_eq!(assembled.request.model, "test-model");
        assert_eq!(assembled.request.temperature, 0.2);
        assert_eq!(assembled.request.max_tokens, 512);
        assert_eq!(assembled.request.top_p, 0.9);
    }
}
