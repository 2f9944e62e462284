//! Seams to the management layer that owns profiles and documents.
//!
//! Profile CRUD, document upload, and format extraction live outside this
//! crate; the pipeline only ever reads through these traits. The in-memory
//! implementations back the tests and demos.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::profile::Profile;
use crate::types::{DocumentId, ProcessingState, ProfileId};

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("profile {0} not found")]
    ProfileNotFound(ProfileId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("store error: {0}")]
    Store(String),
}

/// Read access to profile configuration.
///
/// Queries fetch a fresh snapshot per message, so profile edits apply to the
/// next message and never to one already in flight.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: ProfileId) -> Result<Profile, BoundaryError>;
}

/// A document's bookkeeping record as the management layer sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub profile_id: ProfileId,
    /// Original filename; recorded in chunk metadata as the source.
    pub filename: String,
    pub state: ProcessingState,
}

/// Access to uploaded documents and their processing lifecycle.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: DocumentId) -> Result<DocumentMeta, BoundaryError>;

    /// The document's already-extracted plain text.
    async fn get_document_content(&self, id: DocumentId) -> Result<String, BoundaryError>;

    async fn set_processing_state(
        &self,
        id: DocumentId,
        state: ProcessingState,
    ) -> Result<(), BoundaryError>;
}

/// In-memory [`ProfileStore`].
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<FxHashMap<ProfileId, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.write().insert(profile.id, profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: ProfileId) -> Result<Profile, BoundaryError> {
        self.profiles
            .read()
            .get(&id)
            .cloned()
            .ok_or(BoundaryError::ProfileNotFound(id))
    }
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<FxHashMap<DocumentId, (DocumentMeta, String)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending document and returns its id.
    pub fn insert(
        &self,
        profile_id: ProfileId,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> DocumentId {
        let id = DocumentId::new();
        let meta = DocumentMeta {
            id,
            profile_id,
            filename: filename.into(),
            state: ProcessingState::Pending,
        };
        self.documents.write().insert(id, (meta, content.into()));
        id
    }

    /// Current processing state, if the document exists.
    pub fn state(&self, id: DocumentId) -> Option<ProcessingState> {
        self.documents.read().get(&id).map(|(meta, _)| meta.state)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: DocumentId) -> Result<DocumentMeta, BoundaryError> {
        self.documents
            .read()
            .get(&id)
            .map(|(meta, _)| meta.clone())
            .ok_or(BoundaryError::DocumentNotFound(id))
    }

    async fn get_document_content(&self, id: DocumentId) -> Result<String, BoundaryError> {
        self.documents
            .read()
            .get(&id)
            .map(|(_, content)| content.clone())
            .ok_or(BoundaryError::DocumentNotFound(id))
    }

    async fn set_processing_state(
        &self,
        id: DocumentId,
        state: ProcessingState,
    ) -> Result<(), BoundaryError> {
        let mut documents = self.documents.write();
        let (meta, _) = documents
            .get_mut(&id)
            .ok_or(BoundaryError::DocumentNotFound(id))?;
        meta.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileSettings, ProviderConfig};

    #[tokio::test]
    async fn profile_store_round_trips() {
        let store = MemoryProfileStore::new();
        let profile = Profile::new(
            "p",
            "{context} {question}",
            ProviderConfig::OpenAi {
                api_key_env: "OPENAI_API_KEY".into(),
            },
            "gpt-4o-mini",
            ProfileSettings::default(),
        )
        .unwrap();
        let id = profile.id;
        store.insert(profile.clone());

        assert_eq!(store.get_profile(id).await.unwrap(), profile);
        assert!(matches!(
            store.get_profile(ProfileId::new()).await,
            Err(BoundaryError::ProfileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn document_store_tracks_state() {
        let store = MemoryDocumentStore::new();
        let id = store.insert(ProfileId::new(), "notes.txt", "hello world");

        assert_eq!(store.state(id), Some(ProcessingState::Pending));
        store
            .set_processing_state(id, ProcessingState::Processed)
            .await
            .unwrap();
        assert_eq!(
            store.get_document(id).await.unwrap().state,
            ProcessingState::Processed
        );
        assert_eq!(store.get_document_content(id).await.unwrap(), "hello world");
    }
}
