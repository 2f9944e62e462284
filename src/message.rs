//! Chat message types and the grounding references attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChunkId, DocumentId, MessageId, SessionId};

/// A single message in a chat session.
///
/// Messages are append-only: once part of a session's history they are never
/// mutated. Assistant messages carry the context chunks that grounded them;
/// user messages always have an empty `context_chunks` list.
///
/// # Examples
/// ```
/// use groundwire::message::ChatMessage;
/// use groundwire::types::SessionId;
///
/// let session = SessionId::new();
/// let msg = ChatMessage::user(session, "What is cosine similarity?");
/// assert!(msg.has_role(ChatMessage::USER));
/// assert!(msg.context_chunks.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    /// The role of the sender; use the constants on [`ChatMessage`].
    pub role: String,
    pub content: String,
    /// Grounding references; populated only on assistant messages that used
    /// retrieval.
    pub context_chunks: Vec<ContextChunk>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";

    /// Creates a message with an explicit role.
    #[must_use]
    pub fn new(session_id: SessionId, role: &str, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role: role.to_string(),
            content: content.into(),
            context_chunks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, Self::USER, content)
    }

    /// Creates an assistant message carrying its grounding chunks.
    #[must_use]
    pub fn assistant(
        session_id: SessionId,
        content: impl Into<String>,
        context_chunks: Vec<ContextChunk>,
    ) -> Self {
        let mut msg = Self::new(session_id, Self::ASSISTANT, content);
        msg.context_chunks = context_chunks;
        msg
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// A reference to a chunk used as grounding context for an assistant answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    /// Source document name shown to the client alongside the excerpt.
    pub source: String,
    pub chunk_index: usize,
    pub similarity: f32,
}
