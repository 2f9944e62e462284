//! Shared identifier and record types used across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifier of a [`crate::profile::Profile`].
    ProfileId
);
id_type!(
    /// Identifier of a source document owned by a profile.
    DocumentId
);
id_type!(
    /// Identifier of an individual indexed chunk.
    ChunkId
);
id_type!(
    /// Identifier of a chat session.
    SessionId
);
id_type!(
    /// Identifier of a single chat message.
    MessageId
);

/// Processing lifecycle of a document on the ingest path.
///
/// A document moves `Pending → Processing → Processed`; any ingest failure
/// parks it at `Failed` with no partial chunk set left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Processing,
    Processed,
    Failed,
}

/// A chunk returned from a similarity query, paired with its score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub chunk: crate::index::ChunkRecord,
    /// Cosine similarity in `[-1, 1]`; results below the caller's
    /// `min_similarity` are never returned.
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_and_round_trip() {
        let a = ProfileId::new();
        let b = ProfileId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        let back: ProfileId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn processing_state_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessingState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
