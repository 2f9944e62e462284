//! SQLite-backed vector index using the sqlite-vec extension.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};
use uuid::Uuid;

use super::{
    ChunkRecord, IndexError, VectorIndex, blob_to_vector, check_dimension, vector_to_blob,
};
use crate::types::{ChunkId, DocumentId, ProfileId, ScoredChunk};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    id          TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    profile_id  TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content     TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    embedding   BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks (document_id);
CREATE INDEX IF NOT EXISTS idx_chunks_profile ON chunks (profile_id);
";

/// A [`VectorIndex`] persisted in SQLite.
///
/// Embeddings are stored as little-endian f32 blobs and scored with
/// `vec_distance_cosine`; similarity is `1 - distance`. Document replacement
/// runs in a single transaction so concurrent readers never see a partial
/// chunk set.
pub struct SqliteVectorIndex {
    conn: Connection,
    dimension: usize,
}

/// Untyped row shape pulled out of the connection closure; id parsing
/// happens on the async side where we can report it properly.
struct RawRow {
    id: String,
    document_id: String,
    profile_id: String,
    chunk_index: i64,
    content: String,
    metadata: String,
    embedding: Vec<u8>,
    distance: f32,
}

impl SqliteVectorIndex {
    /// Opens (or creates) the index at `path` with the given embedding
    /// dimension.
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, IndexError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        Self::initialize(conn, dimension).await
    }

    /// Opens a throwaway in-memory index; used by tests.
    pub async fn open_in_memory(dimension: usize) -> Result<Self, IndexError> {
        register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        Self::initialize(conn, dimension).await
    }

    async fn initialize(conn: Connection, dimension: usize) -> Result<Self, IndexError> {
        conn.call(|conn| {
            // Fails fast if the vec extension did not load.
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| IndexError::Storage(err.to_string()))?;
        Ok(Self { conn, dimension })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert_chunks(
        &self,
        document_id: DocumentId,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), IndexError> {
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = chunk
                .embedding
                .as_deref()
                .ok_or(IndexError::MissingEmbedding(chunk.id))?;
            check_dimension(self.dimension, embedding)?;
            rows.push((
                chunk.id.to_string(),
                chunk.document_id.to_string(),
                chunk.profile_id.to_string(),
                chunk.chunk_index as i64,
                chunk.content,
                chunk.metadata.to_string(),
                vector_to_blob(embedding),
            ));
        }

        let document = document_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM chunks WHERE document_id = ?", [&document])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                for row in rows {
                    tx.execute(
                        "INSERT INTO chunks \
                         (id, document_id, profile_id, chunk_index, content, metadata, embedding) \
                         VALUES (?, ?, ?, ?, ?, ?, ?)",
                        row,
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))
    }

    async fn delete_by_document(&self, document_id: DocumentId) -> Result<usize, IndexError> {
        let document = document_id.to_string();
        self.conn
            .call(move |conn| {
                let deleted = conn
                    .execute("DELETE FROM chunks WHERE document_id = ?", [&document])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(deleted)
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))
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

        let profile = profile_id.to_string();
        let query_blob = vector_to_blob(vector);
        let raw: Vec<RawRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, document_id, profile_id, chunk_index, content, metadata, \
                         embedding, vec_distance_cosine(embedding, ?2) AS distance \
                         FROM chunks WHERE profile_id = ?1 \
                         ORDER BY distance ASC, chunk_index ASC \
                         LIMIT ?3",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((&profile, &query_blob, top_k as i64), |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            document_id: row.get(1)?,
                            profile_id: row.get(2)?,
                            chunk_index: row.get(3)?,
                            content: row.get(4)?,
                            metadata: row.get(5)?,
                            embedding: row.get(6)?,
                            distance: row.get(7)?,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;

        let mut scored = Vec::with_capacity(raw.len());
        for row in raw {
            let similarity = 1.0 - row.distance;
            if similarity < min_similarity {
                continue;
            }
            scored.push(ScoredChunk {
                chunk: ChunkRecord {
                    id: ChunkId::from(parse_uuid(&row.id)?),
                    document_id: DocumentId::from(parse_uuid(&row.document_id)?),
                    profile_id: ProfileId::from(parse_uuid(&row.profile_id)?),
                    chunk_index: row.chunk_index as usize,
                    content: row.content,
                    metadata: serde_json::from_str(&row.metadata)
                        .unwrap_or(serde_json::Value::Null),
                    embedding: Some(blob_to_vector(&row.embedding)),
                },
                similarity,
            });
        }
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, IndexError> {
    Uuid::parse_str(raw).map_err(|err| IndexError::Storage(format!("corrupt id '{raw}': {err}")))
}

/// Registers sqlite-vec as an auto extension; safe to call repeatedly.
fn register_sqlite_vec() -> Result<(), IndexError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *const c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(IndexError::Storage)
}
