//! Similarity retrieval: question in, ranked context chunks out.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::embedder::{EmbedError, Embedder};
use crate::index::{IndexError, VectorIndex};
use crate::profile::Profile;
use crate::types::ScoredChunk;

/// Errors on the retrieval path.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Embeds a question and queries the vector index with the profile's
/// retrieval settings.
///
/// An empty result is a normal outcome (the assembler renders an explicit
/// "no context" marker); only embedding or storage failures are errors.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-k chunks for `question` under `profile`'s threshold and budget.
    pub async fn retrieve(
        &self,
        profile: &Profile,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, RetrieveError> {
        let vector = self.embedder.embed(question).await?;
        let results = self
            .index
            .query(
                profile.id,
                &vector,
                profile.settings.max_context_chunks,
                profile.settings.similarity_threshold,
            )
            .await?;
        debug!(
            profile_id = %profile.id,
            matches = results.len(),
            threshold = profile.settings.similarity_threshold,
            "retrieval complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::index::{ChunkRecord, MemoryVectorIndex};
    use crate::profile::{ProfileSettings, ProviderConfig};
    use crate::types::DocumentId;

    fn profile_with(settings: ProfileSettings) -> Profile {
        Profile::new(
            "retrieval-test",
            "{context}\n{question}",
            ProviderConfig::CustomHttp {
                base_url: "http://localhost:11434/v1".into(),
                api_key_env: None,
            },
            "test-model",
            settings,
        )
        .unwrap()
    }

    async fn seed(
        index: &MemoryVectorIndex,
        profile: &Profile,
        chunks: &[(usize, Vec<f32>)],
    ) {
        let doc = DocumentId::new();
        let records = chunks
            .iter()
            .map(|(idx, embedding)| {
                ChunkRecord::new(doc, profile.id, *idx, format!("chunk {idx}"))
                    .with_embedding(embedding.clone())
            })
            .collect();
        index.upsert_chunks(doc, records).await.unwrap();
    }

    #[tokio::test]
    async fn respects_max_context_chunks_and_threshold() {
        let embedder = Arc::new(MockEmbedder::new(2));
        embedder.pin("what is up?", vec![1.0, 0.0]);
        let index = Arc::new(MemoryVectorIndex::new(2));

        let profile = profile_with(ProfileSettings {
            max_context_chunks: 2,
            similarity_threshold: 0.5,
            ..Default::default()
        });
        seed(
            &index,
            &profile,
            &[
                (0, vec![1.0, 0.0]),
                (1, vec![0.9, 0.1]),
                (2, vec![0.8, 0.2]),
                (3, vec![0.0, 1.0]),
            ],
        )
        .await;

        let retriever = Retriever::new(embedder, index);
        let results = retriever.retrieve(&profile, "what is up?").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_index, 0);
        assert_eq!(results[1].chunk.chunk_index, 1);
    }

    #[tokio::test]
    async fn no_matches_is_empty_not_an_error() {
        let embedder = Arc::new(MockEmbedder::new(2));
        embedder.pin("unrelated", vec![1.0, 0.0]);
        let index = Arc::new(MemoryVectorIndex::new(2));

        let profile = profile_with(ProfileSettings {
            similarity_threshold: 0.99,
            ..Default::default()
        });
        seed(&index, &profile, &[(0, vec![0.0, 1.0])]).await;

        let retriever = Retriever::new(embedder, index);
        let results = retriever.retrieve(&profile, "unrelated").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let embedder = Arc::new(MockEmbedder::failing(
            2,
            EmbedError::ProviderUnavailable("down".into()),
        ));
        let index = Arc::new(MemoryVectorIndex::new(2));
        let profile = profile_with(ProfileSettings::default());

        let retriever = Retriever::new(embedder, index);
        let err = retriever.retrieve(&profile, "anything").await.unwrap_err();
        assert!(matches!(err, RetrieveError::Embed(_)));
    }
}
