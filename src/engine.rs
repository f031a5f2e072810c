//! Engine façade.
//!
//! Wires the store, vector index, providers, and session manager together
//! behind one dependency-injected struct — no module-level singletons, so
//! any number of tenants and sessions share a process without hidden
//! state. The HTTP adapter and CLI call these methods and nothing else.
//!
//! Construction warms the in-memory vector index from the embeddings
//! persisted in the store, so retrieval works immediately after a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::answer;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::EngineError;
use crate::extract;
use crate::index::EmbeddingIndex;
use crate::ingest;
use crate::llm::ChatClient;
use crate::meta;
use crate::models::{Answer, Document, DocumentStatus, Role, Turn};
use crate::retrieve;
use crate::session::SessionManager;
use crate::store::Store;

/// Aggregated corpus overview for one tenant.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub documents: usize,
    pub failed_documents: usize,
    pub chunks: usize,
    pub total_pages: i64,
    pub total_chars: i64,
}

/// The document indexing and grounded answer engine.
pub struct Engine {
    config: Config,
    store: Arc<dyn Store>,
    index: EmbeddingIndex,
    embedder: Arc<dyn EmbeddingClient>,
    chat_client: Arc<dyn ChatClient>,
    sessions: SessionManager,
    ingest_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    /// Build an engine and warm the vector index from persisted
    /// embeddings. Vectors whose dimensionality no longer matches the
    /// configured embedding model are skipped with a warning.
    pub async fn new(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingClient>,
        chat_client: Arc<dyn ChatClient>,
    ) -> anyhow::Result<Self> {
        let index = EmbeddingIndex::new(embedder.dims());

        let records = store.all_embeddings().await?;
        let mut warmed = 0usize;
        for rec in records {
            match index.add(&rec.chunk_id, &rec.document_id, &rec.tenant_id, rec.vector) {
                Ok(()) => warmed += 1,
                Err(e) => warn!(chunk_id = %rec.chunk_id, "skipping stale embedding: {}", e),
            }
        }
        if warmed > 0 {
            info!(entries = warmed, "vector index warmed from store");
        }

        let sessions = SessionManager::new(store.clone());

        Ok(Self {
            config,
            store,
            index,
            embedder,
            chat_client,
            sessions,
            ingest_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Ingest a PDF upload. Returns the `Indexed` document, or an
    /// `Ingestion` error with the document left `Failed` and inspectable.
    pub async fn ingest_document(
        &self,
        tenant_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Document, EngineError> {
        match extract::extract_pdf(bytes) {
            Ok(extracted) => {
                self.ingest_text(
                    tenant_id,
                    filename,
                    &extracted.raw_text,
                    extracted.page_count as i64,
                )
                .await
            }
            Err(e) => Err(ingest::record_extraction_failure(
                self.store.as_ref(),
                tenant_id,
                filename,
                &e.to_string(),
            )
            .await),
        }
    }

    /// Ingest pre-extracted text under the per-document ingestion lock.
    pub async fn ingest_text(
        &self,
        tenant_id: &str,
        filename: &str,
        raw_text: &str,
        page_count: i64,
    ) -> Result<Document, EngineError> {
        let doc = ingest::prepare_document(tenant_id, filename, raw_text, page_count);

        let lock = {
            let mut locks = self.ingest_locks.lock().await;
            locks
                .entry(doc.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock().await;

        let result = ingest::run_pipeline(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            &self.config.chunking,
            &doc,
        )
        .await;

        drop(guard);
        self.ingest_locks.lock().await.remove(&doc.id);
        result
    }

    /// A tenant's documents in upload order, `Deleted` ones excluded.
    pub async fn list_documents(&self, tenant_id: &str) -> Result<Vec<Document>, EngineError> {
        self.store
            .list_documents(tenant_id)
            .await
            .map_err(EngineError::storage)
    }

    /// Fetch one document, enforcing tenant ownership.
    pub async fn get_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Document, EngineError> {
        let doc = self
            .store
            .get_document(document_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::NotFound(format!("document {}", document_id)))?;
        if doc.tenant_id != tenant_id {
            return Err(EngineError::TenantMismatch(format!(
                "document {}",
                document_id
            )));
        }
        Ok(doc)
    }

    /// Delete a document, cascading to its chunks and embeddings before
    /// returning. Idempotent: unknown or already-deleted ids are a no-op.
    /// A cross-tenant attempt is rejected, never silently scoped down.
    pub async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), EngineError> {
        let doc = match self
            .store
            .get_document(document_id)
            .await
            .map_err(EngineError::storage)?
        {
            None => return Ok(()),
            Some(d) => d,
        };
        if doc.tenant_id != tenant_id {
            return Err(EngineError::TenantMismatch(format!(
                "document {}",
                document_id
            )));
        }
        if doc.status == DocumentStatus::Deleted {
            return Ok(());
        }

        self.index.remove_all(document_id);
        self.store
            .delete_document(document_id)
            .await
            .map_err(EngineError::storage)?;
        info!(tenant_id, document_id, "document deleted");
        Ok(())
    }

    /// Answer a query within a session: meta-queries short-circuit to the
    /// document store; everything else goes retrieval → synthesis. The
    /// session lock is held across read-synthesize-append so concurrent
    /// messages in one session cannot interleave histories.
    pub async fn chat(
        &self,
        tenant_id: &str,
        session_id: &str,
        query: &str,
    ) -> Result<Answer, EngineError> {
        let lock = self.sessions.lock(tenant_id, session_id).await;
        let _guard = lock.lock().await;

        if let Some(answer) = meta::try_resolve(self.store.as_ref(), tenant_id, query)
            .await
            .map_err(EngineError::storage)?
        {
            self.append_exchange(tenant_id, session_id, query, &answer)
                .await?;
            return Ok(answer);
        }

        let history = self
            .sessions
            .recent_turns(tenant_id, session_id, self.config.session.window_turns)
            .await
            .map_err(EngineError::storage)?;

        let passages = retrieve::retrieve(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            tenant_id,
            query,
            self.config.retrieval.top_k,
        )
        .await?;

        let answer = answer::synthesize(
            self.chat_client.as_ref(),
            &self.config.llm,
            self.config.retrieval.max_context_chars,
            &passages,
            &history,
            query,
        )
        .await?;

        // Only a completed exchange is recorded; a provider outage above
        // leaves the history untouched so the caller can retry cleanly.
        self.append_exchange(tenant_id, session_id, query, &answer)
            .await?;
        Ok(answer)
    }

    /// A session's most recent turns, oldest first.
    pub async fn history(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, EngineError> {
        self.sessions
            .recent_turns(tenant_id, session_id, limit)
            .await
            .map_err(EngineError::storage)
    }

    /// Aggregate corpus overview for one tenant.
    pub async fn corpus_stats(&self, tenant_id: &str) -> Result<CorpusStats, EngineError> {
        let docs = self.list_documents(tenant_id).await?;

        let mut stats = CorpusStats {
            documents: 0,
            failed_documents: 0,
            chunks: 0,
            total_pages: 0,
            total_chars: 0,
        };
        for doc in &docs {
            match doc.status {
                DocumentStatus::Indexed => {
                    stats.documents += 1;
                    stats.total_pages += doc.page_count;
                    stats.total_chars += doc.char_count;
                    stats.chunks += self
                        .store
                        .chunks_for_document(&doc.id)
                        .await
                        .map_err(EngineError::storage)?
                        .len();
                }
                DocumentStatus::Failed => stats.failed_documents += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn append_exchange(
        &self,
        tenant_id: &str,
        session_id: &str,
        query: &str,
        answer: &Answer,
    ) -> Result<(), EngineError> {
        let now = Utc::now().timestamp();
        let user_turn = Turn {
            role: Role::User,
            text: query.to_string(),
            created_at: now,
            cited_document_ids: Vec::new(),
        };
        let assistant_turn = Turn {
            role: Role::Assistant,
            text: answer.text.clone(),
            created_at: now,
            cited_document_ids: answer.cited_document_ids.clone(),
        };
        self.sessions
            .append_turn(tenant_id, session_id, &user_turn)
            .await
            .map_err(EngineError::storage)?;
        self.sessions
            .append_turn(tenant_id, session_id, &assistant_turn)
            .await
            .map_err(EngineError::storage)?;
        Ok(())
    }
}
