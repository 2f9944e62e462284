//! Vector storage backends for chunk embeddings.
//!
//! The [`VectorIndex`] trait abstracts over storage implementations so the
//! ingest and query paths never depend on a specific database:
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorIndex trait│
//!                  │  (async CRUD +   │
//!                  │  cosine queries) │
//!                  └────────┬─────────┘
//!                           │
//!               ┌───────────┴───────────┐
//!               ▼                       ▼
//!       ┌───────────────┐      ┌────────────────┐
//!       │    SQLite     │      │   In-memory    │
//!       │  sqlite-vec   │      │ (tests, demos) │
//!       └───────────────┘      └────────────────┘
//! ```
//!
//! Both backends share the ranking contract: results ordered by descending
//! cosine similarity with ties broken by ascending `chunk_index`, nothing
//! below the caller's `min_similarity`, and an empty result is an empty
//! list rather than an error.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::ConfigError;
use crate::types::{ChunkId, DocumentId, ProfileId, ScoredChunk};

pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;

/// A chunk with its embedding, ready for storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: DocumentId,
    /// Denormalized owner so queries can scope by profile without joins.
    pub profile_id: ProfileId,
    /// Zero-based order within the document; contiguous after ingest.
    pub chunk_index: usize,
    pub content: String,
    /// Free-form source metadata (filename, page, section).
    pub metadata: serde_json::Value,
    /// The embedding vector; always present for indexed chunks.
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn new(
        document_id: DocumentId,
        profile_id: ProfileId,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: ChunkId::new(),
            document_id,
            profile_id,
            chunk_index,
            content: content.into(),
            metadata: serde_json::Value::Object(Default::default()),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Source document name recorded at ingest, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Errors from vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector storage error: {0}")]
    Storage(String),
    /// Dimension mismatches and other fatal misconfiguration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("chunk {0} has no embedding")]
    MissingEmbedding(ChunkId),
}

/// Persistent store of chunk vectors answering cosine-similarity queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The embedding dimension this index was declared with.
    fn dimension(&self) -> usize;

    /// Atomically replaces the chunk set for `document_id` with `chunks`.
    ///
    /// Readers never observe a partial set: a query racing this call sees
    /// either the old chunks or the new ones. Every record must carry an
    /// embedding of the declared dimension.
    async fn upsert_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), IndexError>;

    /// Removes every chunk belonging to `document_id`; returns the count.
    async fn delete_by_document(&self, document_id: DocumentId) -> Result<usize, IndexError>;

    /// Returns up to `top_k` chunks for `profile_id` ranked by descending
    /// cosine similarity (ties: ascending `chunk_index`), excluding results
    /// below `min_similarity`. An empty list means "no grounding found".
    async fn query(
        &self,
        profile_id: ProfileId,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Total number of chunks in the index.
    async fn count(&self) -> Result<usize, IndexError>;
}

/// Cosine similarity between two vectors; zero for mismatched or degenerate
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Encodes a vector as the little-endian f32 blob sqlite-vec operates on.
pub(crate) fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decodes a little-endian f32 blob back into a vector.
pub(crate) fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Validates a vector against the index's declared dimension.
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::Config(ConfigError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }));
    }
    Ok(())
}
