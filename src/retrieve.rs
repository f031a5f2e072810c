//! Query-time retrieval.
//!
//! Embeds the query, asks the vector index for the tenant's nearest chunks,
//! and resolves each hit against the store. Resolution fails closed: a
//! dangling chunk reference (for example a cascade delete racing the query)
//! is dropped from the results, never surfaced as an error, and a parent
//! document that is no longer `Indexed` drops its chunks with it.
//!
//! Adjacent hits from the same document (`sequence_index` differing by 1)
//! are merged into a single passage so near-duplicate overlapping context
//! does not crowd distinct sources out of the prompt budget. The merged
//! text is sliced from the document's raw text across the combined char
//! range, which removes the chunk overlap exactly; the merged passage keeps
//! the highest score of its run.

use tracing::debug;

use crate::embedding::{embed_query, EmbeddingClient};
use crate::error::EngineError;
use crate::index::EmbeddingIndex;
use crate::models::{Document, DocumentStatus, RetrievedChunk};
use crate::store::Store;

/// A prompt-ready passage: one retrieved chunk, or a merged run of
/// adjacent ones.
#[derive(Debug, Clone)]
pub struct ContextPassage {
    pub document: Document,
    /// The retrieved chunks folded into this passage, in sequence order.
    pub chunk_ids: Vec<String>,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub score: f32,
}

/// Retrieve the top-`k` passages for a tenant's query.
pub async fn retrieve(
    store: &dyn Store,
    index: &EmbeddingIndex,
    embedder: &dyn EmbeddingClient,
    tenant_id: &str,
    query_text: &str,
    k: usize,
) -> Result<Vec<ContextPassage>, EngineError> {
    if query_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query_text).await?;
    let hits = index
        .query(tenant_id, &query_vec, k)
        .map_err(EngineError::storage)?;

    let mut resolved: Vec<RetrievedChunk> = Vec::new();
    for (chunk_id, score) in hits {
        let chunk = match store
            .get_chunk(&chunk_id)
            .await
            .map_err(EngineError::storage)?
        {
            Some(c) => c,
            None => {
                debug!(%chunk_id, "dropping dangling chunk reference");
                continue;
            }
        };
        let document = match store
            .get_document(&chunk.document_id)
            .await
            .map_err(EngineError::storage)?
        {
            Some(d) if d.status == DocumentStatus::Indexed && d.tenant_id == tenant_id => d,
            _ => {
                debug!(%chunk_id, "dropping chunk of unavailable document");
                continue;
            }
        };
        resolved.push(RetrievedChunk {
            chunk,
            document,
            score,
        });
    }

    Ok(merge_adjacent(resolved))
}

/// Fold adjacent retrieved chunks of the same document into single
/// passages, keeping the highest score per run, then rank passages by
/// score descending (document id and position break ties for determinism).
pub fn merge_adjacent(mut chunks: Vec<RetrievedChunk>) -> Vec<ContextPassage> {
    chunks.sort_by(|a, b| {
        a.chunk
            .document_id
            .cmp(&b.chunk.document_id)
            .then(a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
    });

    let mut passages: Vec<ContextPassage> = Vec::new();
    let mut run_tail: Option<(String, i64)> = None;

    for rc in chunks {
        let extends_run = matches!(
            &run_tail,
            Some((doc_id, seq))
                if *doc_id == rc.chunk.document_id && rc.chunk.sequence_index == seq + 1
        );
        run_tail = Some((rc.chunk.document_id.clone(), rc.chunk.sequence_index));

        if extends_run {
            let p = passages.last_mut().unwrap();
            p.char_end = rc.chunk.char_end;
            p.text = slice_chars(&rc.document.raw_text, p.char_start, p.char_end);
            p.score = p.score.max(rc.score);
            p.chunk_ids.push(rc.chunk.id);
        } else {
            passages.push(ContextPassage {
                char_start: rc.chunk.char_start,
                char_end: rc.chunk.char_end,
                text: rc.chunk.text,
                chunk_ids: vec![rc.chunk.id],
                score: rc.score,
                document: rc.document,
            });
        }
    }

    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
            .then_with(|| a.char_start.cmp(&b.char_start))
    });
    passages
}

/// Slice a string by char offsets (not bytes).
fn slice_chars(s: &str, start: usize, end: usize) -> String {
    s.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, DocumentStatus};

    fn doc(id: &str, raw_text: &str) -> Document {
        Document {
            id: id.to_string(),
            tenant_id: "t".to_string(),
            filename: format!("{}.pdf", id),
            raw_text: raw_text.to_string(),
            page_count: 1,
            char_count: raw_text.chars().count() as i64,
            content_hash: "h".to_string(),
            uploaded_at: 0,
            status: DocumentStatus::Indexed,
            failure_reason: None,
        }
    }

    fn retrieved(
        document: &Document,
        chunk_id: &str,
        seq: i64,
        char_start: usize,
        char_end: usize,
        score: f32,
    ) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: chunk_id.to_string(),
                document_id: document.id.clone(),
                tenant_id: document.tenant_id.clone(),
                sequence_index: seq,
                text: slice_chars(&document.raw_text, char_start, char_end),
                char_start,
                char_end,
                embedding: Vec::new(),
            },
            document: document.clone(),
            score,
        }
    }

    #[test]
    fn adjacent_chunks_merge_with_overlap_removed() {
        let d = doc("d1", "0123456789abcdefghij");
        // chunks [0,12) and [8,20): 4 chars of overlap
        let input = vec![
            retrieved(&d, "c1", 0, 0, 12, 0.9),
            retrieved(&d, "c2", 1, 8, 20, 0.7),
        ];

        let passages = merge_adjacent(input);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "0123456789abcdefghij");
        assert_eq!(passages[0].chunk_ids, vec!["c1", "c2"]);
        assert!((passages[0].score - 0.9).abs() < 1e-6, "keeps highest score");
    }

    #[test]
    fn non_adjacent_chunks_stay_separate() {
        let d = doc("d1", "0123456789abcdefghijklmnopqrst");
        let input = vec![
            retrieved(&d, "c1", 0, 0, 10, 0.5),
            retrieved(&d, "c3", 2, 20, 30, 0.8),
        ];

        let passages = merge_adjacent(input);
        assert_eq!(passages.len(), 2);
        // ranked by score, not position
        assert_eq!(passages[0].chunk_ids, vec!["c3"]);
        assert_eq!(passages[1].chunk_ids, vec!["c1"]);
    }

    #[test]
    fn chunks_of_different_documents_never_merge() {
        let d1 = doc("d1", "aaaaaaaaaa");
        let d2 = doc("d2", "bbbbbbbbbb");
        let input = vec![
            retrieved(&d1, "c1", 0, 0, 10, 0.6),
            retrieved(&d2, "c2", 1, 0, 10, 0.4),
        ];

        let passages = merge_adjacent(input);
        assert_eq!(passages.len(), 2);
    }

    #[test]
    fn three_chunk_run_merges_fully() {
        let d = doc("d1", "0123456789abcdefghijklmnopqrst");
        let input = vec![
            retrieved(&d, "c1", 0, 0, 12, 0.3),
            retrieved(&d, "c2", 1, 8, 22, 0.9),
            retrieved(&d, "c3", 2, 18, 30, 0.5),
        ];

        let passages = merge_adjacent(input);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "0123456789abcdefghijklmnopqrst");
        assert_eq!(passages[0].char_start, 0);
        assert_eq!(passages[0].char_end, 30);
        assert!((passages[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_input_yields_no_passages() {
        assert!(merge_adjacent(Vec::new()).is_empty());
    }

    #[test]
    fn slice_chars_is_char_based() {
        assert_eq!(slice_chars("über", 1, 3), "be");
        assert_eq!(slice_chars("abc", 0, 10), "abc");
    }
}
