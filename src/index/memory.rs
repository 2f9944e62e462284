//! In-memory vector index for tests and single-process demos.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{ChunkRecord, IndexError, VectorIndex, check_dimension, cosine_similarity};
use crate::types::{DocumentId, ProfileId, ScoredChunk};

/// A [`VectorIndex`] held entirely in process memory.
///
/// Chunks are grouped per document, so replacing or deleting a document's
/// set is a single map operation and queries racing a writer see either the
/// whole old set or the whole new one.
pub struct MemoryVectorIndex {
    dimension: usize,
    documents: RwLock<FxHashMap<DocumentId, Vec<ChunkRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: RwLock::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), IndexError> {
        for chunk in &chunks {
            let embedding = chunk
                .embedding
                .as_deref()
                .ok_or(IndexError::MissingEmbedding(chunk.id))?;
            check_dimension(self.dimension, embedding)?;
        }
        self.documents.write().insert(document_id, chunks);
        Ok(())
    }

    async fn delete_by_document(&self, document_id: DocumentId) -> Result<usize, IndexError> {
        let removed = self
            .documents
            .write()
            .remove(&document_id)
            .map_or(0, |chunks| chunks.len());
        Ok(removed)
    }

    async fn query(
        &self,
        profile_id: ProfileId,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        check_dimension(self.dimension, vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read();
        let mut scored: Vec<ScoredChunk> = documents
            .values()
            .flatten()
            .filter(|chunk| chunk.profile_id == profile_id)
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                let similarity = cosine_similarity(vector, embedding);
                (similarity >= min_similarity).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    similarity,
                })
            })
            .collect();
        drop(documents);

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.documents.read().values().map(Vec::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        document_id: DocumentId,
        profile_id: ProfileId,
        chunk_index: usize,
        embedding: Vec<f32>,
    ) -> ChunkRecord {
        ChunkRecord::new(document_id, profile_id, chunk_index, format!("chunk {chunk_index}"))
            .with_embedding(embedding)
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_descending() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        index
            .upsert_chunks(
                doc,
                vec![
                    record(doc, profile, 0, vec![0.0, 1.0]),
                    record(doc, profile, 1, vec![1.0, 0.0]),
                    record(doc, profile, 2, vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let results = index.query(profile, &[1.0, 0.0], 10, 0.1).await.unwrap();
        let order: Vec<usize> = results.iter().map(|s| s.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2]);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn ties_break_by_ascending_chunk_index() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        index
            .upsert_chunks(
                doc,
                vec![
                    record(doc, profile, 3, vec![1.0, 0.0]),
                    record(doc, profile, 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.query(profile, &[1.0, 0.0], 10, 0.0).await.unwrap();
        let order: Vec<usize> = results.iter().map(|s| s.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[tokio::test]
    async fn threshold_filters_weak_matches() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        index
            .upsert_chunks(doc, vec![record(doc, profile, 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        let results = index.query(profile, &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn query_scopes_by_profile() {
        let index = MemoryVectorIndex::new(2);
        let mine = ProfileId::new();
        let theirs = ProfileId::new();
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        index
            .upsert_chunks(doc_a, vec![record(doc_a, mine, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert_chunks(doc_b, vec![record(doc_b, theirs, 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let results = index.query(mine, &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.profile_id, mine);
    }

    #[tokio::test]
    async fn upsert_replaces_the_whole_document() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        index
            .upsert_chunks(
                doc,
                vec![
                    record(doc, profile, 0, vec![1.0, 0.0]),
                    record(doc, profile, 1, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        index
            .upsert_chunks(doc, vec![record(doc, profile, 0, vec![0.5, 0.5])])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        index
            .upsert_chunks(
                doc,
                vec![
                    record(doc, profile, 0, vec![1.0, 0.0]),
                    record(doc, profile, 1, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(index.delete_by_document(doc).await.unwrap(), 2);
        assert_eq!(index.delete_by_document(doc).await.unwrap(), 0);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_dimension_is_a_config_error() {
        let index = MemoryVectorIndex::new(4);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        let err = index
            .upsert_chunks(doc, vec![record(doc, profile, 0, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));

        let err = index.query(profile, &[1.0, 0.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[tokio::test]
    async fn missing_embedding_is_rejected() {
        let index = MemoryVectorIndex::new(2);
        let profile = ProfileId::new();
        let doc = DocumentId::new();
        let bare = ChunkRecord::new(doc, profile, 0, "no vector");
        let err = index.upsert_chunks(doc, vec![bare]).await.unwrap_err();
        assert!(matches!(err, IndexError::MissingEmbedding(_)));
    }
}
