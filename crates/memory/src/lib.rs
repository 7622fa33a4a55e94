//! Retrieval layer for Quill.
//!
//! Two external collaborators do all the real work:
//!
//! - an **embedding service** turning text into fixed-length vectors
//!   (1536 dimensions by default), and
//! - a **vector store** (Qdrant) holding vectors with opaque string payloads
//!   and answering nearest-neighbour queries.
//!
//! ```text
//! question ──► Embedder ──► VectorStore::query ──► [PayloadRecord]
//!                                                      │
//!                                                      ▼
//!                                    prompt::assemble ──► [system, user]
//! ```

pub mod embedding;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod types;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use retrieval::Retriever;
pub use store::{QdrantStore, VectorStore};
pub use types::{EmbeddingConfig, JournalEntry, PayloadRecord, ScoredRecord, VectorStoreConfig};
