//! # Groundwire: Retrieval-Grounded Chat Pipeline
//!
//! Groundwire turns uploaded documents into retrieval-grounded chat: an
//! ingest path that chunks and embeds documents into a vector index, and a
//! query path that answers each user message with streamed, context-cited
//! responses over a stateful session.
//!
//! ## Core Concepts
//!
//! - **Profiles**: A prompt template, provider/model choice, and retrieval
//!   settings, owning a set of documents
//! - **Ingest**: Document → chunks → embeddings → atomic vector index write
//! - **Query**: Question → similarity retrieval → prompt assembly →
//!   streamed provider dispatch
//! - **Sessions**: Per-session actors that serialize requests, sequence
//!   wire events, and survive transport loss
//!
//! ## Quick Start
//!
//! ### Ingesting a document
//!
//! ```no_run
//! use std::sync::Arc;
//! use groundwire::boundary::MemoryDocumentStore;
//! use groundwire::embedder::MockEmbedder;
//! use groundwire::index::MemoryVectorIndex;
//! use groundwire::ingest::IngestPipeline;
//! use groundwire::profile::{Profile, ProfileSettings, ProviderConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = Profile::new(
//!     "docs-assistant",
//!     "Use this context:\n{context}\n\nQuestion: {question}",
//!     ProviderConfig::OpenAi { api_key_env: "OPENAI_API_KEY".into() },
//!     "gpt-4o-mini",
//!     ProfileSettings::default(),
//! )?;
//!
//! let documents = Arc::new(MemoryDocumentStore::new());
//! let doc = documents.insert(profile.id, "notes.txt", "the document text");
//!
//! let pipeline = IngestPipeline::new(
//!     documents,
//!     Arc::new(MockEmbedder::new(768)),
//!     Arc::new(MemoryVectorIndex::new(768)),
//! );
//! let chunks = pipeline.ingest_document(doc, &profile).await?;
//! println!("indexed {chunks} chunks");
//! # Ok(())
//! # }
//! ```
//!
//! ### Running a chat session
//!
//! ```no_run
//! use std::sync::Arc;
//! use groundwire::boundary::MemoryProfileStore;
//! use groundwire::embedder::MockEmbedder;
//! use groundwire::index::MemoryVectorIndex;
//! use groundwire::profile::{Profile, ProfileSettings, ProviderConfig};
//! use groundwire::providers::{HttpProviderRegistry, ProviderDispatcher};
//! use groundwire::retriever::Retriever;
//! use groundwire::session::{MemorySink, QueryPipeline, SessionOrchestrator};
//!
//! # async fn demo(profile: Profile) -> Result<(), Box<dyn std::error::Error>> {
//! let profiles = Arc::new(MemoryProfileStore::new());
//! let profile_id = profile.id;
//! profiles.insert(profile);
//!
//! let retriever = Retriever::new(
//!     Arc::new(MockEmbedder::new(768)),
//!     Arc::new(MemoryVectorIndex::new(768)),
//! );
//! let orchestrator = SessionOrchestrator::new(Arc::new(QueryPipeline::new(
//!     profiles,
//!     retriever,
//!     Arc::new(HttpProviderRegistry),
//!     ProviderDispatcher::new(),
//! )));
//!
//! let session = orchestrator.open_session(profile_id);
//! session.connect(MemorySink::new())?;
//! session.send_message("What does the design doc say about retries?").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`profile`] - Profiles, provider configuration, validation
//! - [`chunker`] - Deterministic overlapping text chunking
//! - [`embedder`] - Embedding providers (HTTP and deterministic mock)
//! - [`index`] - Vector storage (SQLite + sqlite-vec, in-memory)
//! - [`retriever`] - Similarity retrieval over the index
//! - [`prompt`] - Prompt assembly and context budgeting
//! - [`providers`] - Chat providers and the retry/fallback dispatcher
//! - [`session`] - Session actors, wire events, delivery sinks
//! - [`ingest`] - The document ingest pipeline
//! - [`boundary`] - Seams to the out-of-crate management layer
//! - [`telemetry`] - Tracing subscriber setup

pub mod boundary;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod message;
pub mod profile;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod types;
