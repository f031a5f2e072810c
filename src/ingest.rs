//! Document ingestion pipeline.
//!
//! Coordinates the full flow for one document: store record → chunking →
//! embedding → atomic commit → vector index. The status machine is the
//! contract here: ingestion ends with the document `Indexed`, or `Failed`
//! with a recorded reason and nothing partial committed. A storage fault
//! during the final commit leaves the document `Uploading` with no chunks
//! visible, which is cleanly resumable by re-uploading.
//!
//! Nothing is written to the chunk table or the vector index until every
//! chunk has an embedding, so an ingestion failure can never leave
//! orphaned embeddings behind.
//!
//! The engine wraps [`run_pipeline`] in a per-document ingestion lock;
//! this module only assumes it is the single writer for its document.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::EngineError;
use crate::index::EmbeddingIndex;
use crate::models::{Chunk, Document, DocumentStatus};
use crate::store::Store;

/// Build a fresh `Uploading` document record for an upload.
pub fn prepare_document(
    tenant_id: &str,
    filename: &str,
    raw_text: &str,
    page_count: i64,
) -> Document {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    Document {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        filename: filename.to_string(),
        raw_text: raw_text.to_string(),
        page_count,
        char_count: raw_text.chars().count() as i64,
        content_hash,
        uploaded_at: Utc::now().timestamp(),
        status: DocumentStatus::Uploading,
        failure_reason: None,
    }
}

/// Record an extraction failure as a `Failed` document so the failure is
/// inspectable, and return the error the caller surfaces.
pub async fn record_extraction_failure(
    store: &dyn Store,
    tenant_id: &str,
    filename: &str,
    reason: &str,
) -> EngineError {
    let doc = prepare_document(tenant_id, filename, "", 0);
    if let Err(e) = store.put_document(&doc).await {
        return EngineError::storage(e);
    }
    if let Err(e) = store.mark_failed(&doc.id, reason).await {
        return EngineError::storage(e);
    }
    warn!(tenant_id, filename, reason, "PDF extraction failed");
    EngineError::Ingestion(reason.to_string())
}

/// Run chunking, embedding, and the atomic commit for a prepared document.
pub async fn run_pipeline(
    store: &dyn Store,
    index: &EmbeddingIndex,
    embedder: &dyn EmbeddingClient,
    chunking: &ChunkingConfig,
    doc: &Document,
) -> Result<Document, EngineError> {
    store.put_document(doc).await.map_err(EngineError::storage)?;

    let spans = chunker::split(
        &doc.raw_text,
        chunking.max_chunk_chars,
        chunking.overlap_chars,
    );
    if spans.is_empty() {
        return fail(store, &doc.id, "document produced no chunks").await;
    }

    let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
    let vectors = match embedder.embed(&texts).await {
        Ok(v) => v,
        Err(e) => {
            return fail(store, &doc.id, &format!("embedding failed: {}", e)).await;
        }
    };

    if vectors.len() != spans.len() {
        return fail(
            store,
            &doc.id,
            &format!(
                "embedding count mismatch: {} chunks, {} vectors",
                spans.len(),
                vectors.len()
            ),
        )
        .await;
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != index.dims()) {
        return fail(
            store,
            &doc.id,
            &format!(
                "embedding dimensionality mismatch: expected {}, got {}",
                index.dims(),
                v.len()
            ),
        )
        .await;
    }

    let chunks: Vec<Chunk> = spans
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (span, embedding))| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            tenant_id: doc.tenant_id.clone(),
            sequence_index: i as i64,
            text: span.text,
            char_start: span.char_start,
            char_end: span.char_end,
            embedding,
        })
        .collect();

    store
        .commit_indexed(&doc.id, &chunks)
        .await
        .map_err(EngineError::storage)?;

    for chunk in &chunks {
        index
            .add(&chunk.id, &doc.id, &doc.tenant_id, chunk.embedding.clone())
            .map_err(EngineError::storage)?;
    }

    info!(
        tenant_id = %doc.tenant_id,
        filename = %doc.filename,
        document_id = %doc.id,
        chunks = chunks.len(),
        "document indexed"
    );

    let mut indexed = doc.clone();
    indexed.status = DocumentStatus::Indexed;
    Ok(indexed)
}

async fn fail(
    store: &dyn Store,
    document_id: &str,
    reason: &str,
) -> Result<Document, EngineError> {
    store
        .mark_failed(document_id, reason)
        .await
        .map_err(EngineError::storage)?;
    warn!(document_id, reason, "ingestion failed");
    Err(EngineError::Ingestion(reason.to_string()))
}
