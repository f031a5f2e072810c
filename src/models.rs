//! Core data models used throughout the engine.
//!
//! These types represent the documents, chunks, conversation turns, and
//! answers that flow through the ingestion and question-answering pipeline.
//! Every entity carries a `tenant_id`; no operation crosses tenant scope.

use serde::Serialize;

/// Lifecycle state of an ingested document.
///
/// Transitions: `Uploading → Indexed` on successful chunk/embed commit,
/// `Uploading → Failed` on any ingestion error, `Indexed → Deleted` on
/// explicit removal (which cascades to the document's chunks and
/// embeddings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Indexed,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(DocumentStatus::Uploading),
            "indexed" => Some(DocumentStatus::Indexed),
            "failed" => Some(DocumentStatus::Failed),
            "deleted" => Some(DocumentStatus::Deleted),
            _ => None,
        }
    }
}

/// An ingested document and its extraction metadata.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub filename: String,
    pub raw_text: String,
    pub page_count: i64,
    pub char_count: i64,
    /// SHA-256 of the raw text, for spotting re-uploads of identical content.
    pub content_hash: String,
    /// Unix timestamp of the upload.
    pub uploaded_at: i64,
    pub status: DocumentStatus,
    /// Reason recorded when `status` is `Failed`.
    pub failure_reason: Option<String>,
}

/// A bounded contiguous slice of a document's text, the unit of retrieval.
///
/// Chunks are created only during ingestion and deleted exactly when their
/// owning document is deleted. The `[char_start, char_end)` ranges of a
/// document's chunks cover its raw text contiguously with bounded overlap,
/// and `sequence_index` is a contiguous ascending run from 0.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub tenant_id: String,
    pub sequence_index: i64,
    pub text: String,
    /// Start offset in chars into the document's raw text (inclusive).
    pub char_start: usize,
    /// End offset in chars into the document's raw text (exclusive).
    pub char_end: usize,
    pub embedding: Vec<f32>,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A single message within a conversation session.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: i64,
    /// Documents cited by an assistant turn (empty for user turns).
    pub cited_document_ids: Vec<String>,
}

/// The engine's response to a chat query.
///
/// `grounded = false` means the grounding guard fired: the retrieved
/// context was empty or the model reported it insufficient, and `text`
/// carries the fixed refusal message instead of an unsupported claim.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// IDs of the documents whose chunks were actually placed in the
    /// prompt. Derived from the prompt, never parsed from model output.
    pub cited_document_ids: Vec<String>,
    /// Filenames of the cited documents, for display.
    pub sources: Vec<String>,
    pub grounded: bool,
}

impl Answer {
    /// A deterministic, fully-grounded answer (meta-query results).
    pub fn system(text: impl Into<String>) -> Self {
        Answer {
            text: text.into(),
            cited_document_ids: Vec::new(),
            sources: Vec::new(),
            grounded: true,
        }
    }
}

/// A chunk resolved against its parent document after an index lookup.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub document: Document,
    pub score: f32,
}
