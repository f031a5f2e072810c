//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock` for thread safety. Transactional
//! guarantees of the trait collapse to "mutate under one write lock", which
//! preserves the same observable atomicity.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, DocumentStatus, Turn};

use super::{EmbeddingRecord, Store};

struct StoredTurn {
    tenant_id: String,
    session_id: String,
    turn: Turn,
}

/// In-memory store; documents keep insertion order.
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<Chunk>>,
    turns: RwLock<Vec<StoredTurn>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            turns: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        docs.retain(|d| d.id != doc.id);
        docs.push(doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.status != DocumentStatus::Deleted)
            .cloned()
            .collect())
    }

    async fn commit_indexed(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        // Chunks land and the status flips under the same write locks, so
        // no reader sees an Indexed document with a partial chunk set.
        // Lock order is docs then chunks everywhere in this store.
        let mut docs = self.docs.write().unwrap();
        let mut stored = self.chunks.write().unwrap();
        stored.retain(|c| c.document_id != document_id);
        stored.extend(chunks.iter().cloned());
        if let Some(doc) = docs.iter_mut().find(|d| d.id == document_id) {
            doc.status = DocumentStatus::Indexed;
            doc.failure_reason = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, document_id: &str, reason: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        if let Some(doc) = docs.iter_mut().find(|d| d.id == document_id) {
            doc.status = DocumentStatus::Failed;
            doc.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|c| c.document_id != document_id);
        if let Some(doc) = docs.iter_mut().find(|d| d.id == document_id) {
            doc.status = DocumentStatus::Deleted;
        }
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.iter().find(|c| c.id == chunk_id).cloned())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        let mut out: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.sequence_index);
        Ok(out)
    }

    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| {
                docs.iter()
                    .any(|d| d.id == c.document_id && d.status == DocumentStatus::Indexed)
            })
            .map(|c| EmbeddingRecord {
                chunk_id: c.id.clone(),
                document_id: c.document_id.clone(),
                tenant_id: c.tenant_id.clone(),
                vector: c.embedding.clone(),
            })
            .collect())
    }

    async fn append_turn(&self, tenant_id: &str, session_id: &str, turn: &Turn) -> Result<()> {
        let mut turns = self.turns.write().unwrap();
        turns.push(StoredTurn {
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            turn: turn.clone(),
        });
        Ok(())
    }

    async fn recent_turns(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        let turns = self.turns.read().unwrap();
        let matching: Vec<Turn> = turns
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.session_id == session_id)
            .map(|t| t.turn.clone())
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}
