//! Storage abstraction for the engine.
//!
//! The [`Store`] trait defines every persistence operation the engine
//! needs — documents, chunks with their embeddings, and conversation
//! turns — enabling pluggable backends (SQLite for production, in-memory
//! for tests).
//!
//! Two invariants are the backend's responsibility:
//!
//! - **Atomic chunk visibility.** [`commit_indexed`](Store::commit_indexed)
//!   writes a document's full chunk set and flips its status to `Indexed`
//!   in one transaction; no reader ever sees an `Indexed` document with a
//!   partial chunk set.
//! - **Cascading delete.** [`delete_document`](Store::delete_document)
//!   removes the document's chunks (and therefore embeddings) in the same
//!   transaction that marks it `Deleted`, and is an idempotent no-op for
//!   unknown or already-deleted ids.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, Turn};

/// A persisted chunk embedding, used to warm the vector index at startup.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub tenant_id: String,
    pub vector: Vec<f32>,
}

/// Abstract storage backend.
///
/// Implementations must be `Send + Sync` to work with async runtimes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new document record (normally in `Uploading` state).
    async fn put_document(&self, doc: &Document) -> Result<()>;

    /// Retrieve a document by id, in any lifecycle state.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// List a tenant's documents in insertion order, excluding `Deleted`.
    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<Document>>;

    /// Atomically store a document's full chunk set (embeddings included)
    /// and mark it `Indexed`.
    async fn commit_indexed(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Mark a document `Failed`, recording the reason.
    async fn mark_failed(&self, document_id: &str, reason: &str) -> Result<()>;

    /// Mark a document `Deleted` and remove its chunks and embeddings in
    /// the same transaction. Idempotent: unknown or already-deleted ids
    /// are a no-op.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Retrieve a chunk by id.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    /// All chunks of a document, ordered by `sequence_index`.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Every persisted embedding of every `Indexed` document, for warming
    /// the in-memory vector index after a restart.
    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>>;

    /// Append a turn to a session's history, in arrival order.
    async fn append_turn(&self, tenant_id: &str, session_id: &str, turn: &Turn) -> Result<()>;

    /// The most recent `limit` turns of a session, oldest first.
    /// Session scoping is exact-match on `(tenant_id, session_id)`.
    async fn recent_turns(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>>;
}
