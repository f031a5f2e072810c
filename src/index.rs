//! In-memory embedding index.
//!
//! Maps chunk ids to embedding vectors, partitioned by tenant, and answers
//! nearest-neighbor queries by brute-force cosine similarity. The contract
//! is what matters here, not the scan: online insertion and removal without
//! a rebuild, tenant-restricted queries, deterministic ranking (score
//! descending, then chunk id ascending), and rejection of vectors with the
//! wrong dimensionality.
//!
//! A single `RwLock` over the entries makes `remove_all` linearizable with
//! respect to `query`: a query observes either the full old state of a
//! document or none of it, never a half-removed one.

use anyhow::{bail, Result};
use std::sync::RwLock;

struct IndexEntry {
    chunk_id: String,
    document_id: String,
    tenant_id: String,
    vector: Vec<f32>,
}

/// Tenant-scoped vector index over chunk embeddings.
pub struct EmbeddingIndex {
    dims: usize,
    entries: RwLock<Vec<IndexEntry>>,
}

impl EmbeddingIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of indexed vectors, across all tenants.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the vector for a chunk.
    pub fn add(
        &self,
        chunk_id: &str,
        document_id: &str,
        tenant_id: &str,
        vector: Vec<f32>,
    ) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector dimensionality mismatch: index has {}, got {}",
                self.dims,
                vector.len()
            );
        }
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.chunk_id != chunk_id);
        entries.push(IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            tenant_id: tenant_id.to_string(),
            vector,
        });
        Ok(())
    }

    /// Remove every vector belonging to a document. Atomic with respect to
    /// concurrent queries; a no-op for unknown documents.
    pub fn remove_all(&self, document_id: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.document_id != document_id);
    }

    /// Return up to `k` `(chunk_id, score)` pairs for the tenant, ranked by
    /// cosine similarity descending with ties broken by ascending chunk id.
    pub fn query(&self, tenant_id: &str, query_vec: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if query_vec.len() != self.dims {
            bail!(
                "query vector dimensionality mismatch: index has {}, got {}",
                self.dims,
                query_vec.len()
            );
        }
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(String, f32)> = entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .map(|e| (e.chunk_id.clone(), cosine_similarity(query_vec, &e.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn add_rejects_wrong_dims() {
        let index = EmbeddingIndex::new(3);
        assert!(index.add("c1", "d1", "t1", vec![1.0, 2.0]).is_err());
        assert!(index.add("c1", "d1", "t1", vec![1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn query_rejects_wrong_dims() {
        let index = EmbeddingIndex::new(3);
        assert!(index.query("t1", &[1.0], 5).is_err());
    }

    #[test]
    fn query_is_tenant_scoped() {
        let index = EmbeddingIndex::new(2);
        index.add("c1", "d1", "alpha", vec![1.0, 0.0]).unwrap();
        index.add("c2", "d2", "beta", vec![1.0, 0.0]).unwrap();

        let results = index.query("alpha", &[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "c1");
    }

    #[test]
    fn query_ranks_by_similarity_descending() {
        let index = EmbeddingIndex::new(2);
        index.add("far", "d1", "t", vec![0.0, 1.0]).unwrap();
        index.add("near", "d1", "t", vec![1.0, 0.1]).unwrap();

        let results = index.query("t", &[1.0, 0.0], 10).unwrap();
        assert_eq!(results[0].0, "near");
        assert_eq!(results[1].0, "far");
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let index = EmbeddingIndex::new(2);
        index.add("b", "d1", "t", vec![1.0, 0.0]).unwrap();
        index.add("a", "d2", "t", vec![1.0, 0.0]).unwrap();
        index.add("c", "d3", "t", vec![1.0, 0.0]).unwrap();

        let results = index.query("t", &[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn query_truncates_to_k() {
        let index = EmbeddingIndex::new(2);
        for i in 0..10 {
            index
                .add(&format!("c{}", i), "d1", "t", vec![1.0, i as f32 * 0.01])
                .unwrap();
        }
        assert_eq!(index.query("t", &[1.0, 0.0], 3).unwrap().len(), 3);
    }

    #[test]
    fn remove_all_clears_a_document_only() {
        let index = EmbeddingIndex::new(2);
        index.add("c1", "doomed", "t", vec![1.0, 0.0]).unwrap();
        index.add("c2", "doomed", "t", vec![0.9, 0.1]).unwrap();
        index.add("c3", "kept", "t", vec![0.8, 0.2]).unwrap();

        index.remove_all("doomed");

        let results = index.query("t", &[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "c3");

        // idempotent
        index.remove_all("doomed");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn add_replaces_existing_chunk() {
        let index = EmbeddingIndex::new(2);
        index.add("c1", "d1", "t", vec![1.0, 0.0]).unwrap();
        index.add("c1", "d1", "t", vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);

        let results = index.query("t", &[0.0, 1.0], 1).unwrap();
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }
}
