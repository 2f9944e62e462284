//! Document ingest: content to chunks to vectors, atomically visible.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::boundary::{BoundaryError, DocumentStore};
use crate::chunker::{chunk, normalize};
use crate::embedder::{EmbedError, Embedder};
use crate::index::{ChunkRecord, IndexError, VectorIndex};
use crate::profile::{ConfigError, Profile};
use crate::types::{DocumentId, ProcessingState};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("document {0} has no indexable content")]
    EmptyDocument(DocumentId),
}

/// Runs the ingest path for one document at a time; different documents may
/// be ingested concurrently from separate tasks.
///
/// Failure semantics: any error leaves the document in `failed` state with
/// no partial chunk set visible. Either the whole chunk set lands in one
/// atomic index write, or nothing does.
pub struct IngestPipeline {
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl IngestPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            documents,
            embedder,
            index,
        }
    }

    /// Ingests `document_id` under `profile`; returns the number of chunks
    /// indexed.
    pub async fn ingest_document(
        &self,
        document_id: DocumentId,
        profile: &Profile,
    ) -> Result<usize, IngestError> {
        self.documents
            .set_processing_state(document_id, ProcessingState::Processing)
            .await?;

        match self.run(document_id, profile).await {
            Ok(count) => {
                self.documents
                    .set_processing_state(document_id, ProcessingState::Processed)
                    .await?;
                info!(
                    document_id = %document_id,
                    profile_id = %profile.id,
                    chunks = count,
                    "document ingested"
                );
                Ok(count)
            }
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "ingest failed");
                // Best effort; the original error is the one worth reporting.
                let _ = self
                    .documents
                    .set_processing_state(document_id, ProcessingState::Failed)
                    .await;
                Err(err)
            }
        }
    }

    async fn run(&self, document_id: DocumentId, profile: &Profile) -> Result<usize, IngestError> {
        // A mismatched embedder/index pair can never produce usable vectors;
        // fail before any network spend.
        if self.embedder.dimension() != self.index.dimension() {
            return Err(ConfigError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: self.embedder.dimension(),
            }
            .into());
        }

        let meta = self.documents.get_document(document_id).await?;
        let content = self.documents.get_document_content(document_id).await?;
        let normalized = normalize(&content);
        let chunks = chunk(
            &normalized,
            profile.settings.chunk_size,
            profile.settings.chunk_overlap,
        );
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(document_id));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                ChunkRecord::new(document_id, profile.id, chunk.chunk_index, chunk.content)
                    .with_metadata(json!({ "source": meta.filename }))
                    .with_embedding(vector)
            })
            .collect();
        let count = records.len();
        self.index.upsert_chunks(document_id, records).await?;
        Ok(count)
    }

    /// Removes a deleted document's vectors; returns how many were dropped.
    pub async fn delete_document_vectors(
        &self,
        document_id: DocumentId,
    ) -> Result<usize, IngestError> {
        let removed = self.index.delete_by_document(document_id).await?;
        info!(document_id = %document_id, removed, "document vectors deleted");
        Ok(removed)
    }
}
