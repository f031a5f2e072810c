//! Embedding service client.
//!
//! Defines the [`EmbeddingClient`] trait the retriever and ingestion
//! pipeline depend on, plus the HTTP implementation for OpenAI-compatible
//! `/embeddings` endpoints and the vector BLOB codecs used by the SQLite
//! store.
//!
//! # Retry Strategy
//!
//! Transient errors back off exponentially: 1s, 2s, 4s, ... (capped at
//! 2^5). HTTP 429 and 5xx retry; other 4xx fail immediately; network
//! errors retry. Exhausted retries surface
//! [`EngineError::ServiceUnavailable`] so callers can tell "the dependency
//! is down" apart from a grounding refusal.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EngineError;

/// An external service that maps text to fixed-dimension vectors.
///
/// Injected into the engine so tests can substitute a deterministic fake.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality every returned embedding must have.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}

/// Embed a single query text.
pub async fn embed_query(
    client: &dyn EmbeddingClient,
    text: &str,
) -> Result<Vec<f32>, EngineError> {
    let results = client.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::ServiceUnavailable("empty embedding response".to_string()))
}

/// Client for OpenAI-compatible embedding endpoints.
pub struct HttpEmbeddingClient {
    config: EmbeddingConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let url = format!("{}/embeddings", self.config.url.trim_end_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {}", key));
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            EngineError::ServiceUnavailable(format!(
                                "embedding response decode: {}",
                                e
                            ))
                        })?;
                        return parse_embedding_response(&json, self.config.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("embedding API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): retrying will not help.
                    return Err(EngineError::ServiceUnavailable(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(format!("embedding request failed: {}", e));
                    continue;
                }
            }
        }

        Err(EngineError::ServiceUnavailable(last_err.unwrap_or_else(
            || "embedding failed after retries".to_string(),
        )))
    }
}

/// Parse `data[].embedding` arrays from an embeddings response, verifying
/// dimensionality.
fn parse_embedding_response(
    json: &serde_json::Value,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EngineError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        EngineError::ServiceUnavailable("invalid embedding response: missing data array".into())
    })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EngineError::ServiceUnavailable(
                    "invalid embedding response: missing embedding".into(),
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(EngineError::ServiceUnavailable(format!(
                "embedding dimensionality mismatch: expected {}, got {}",
                dims,
                vec.len()
            )));
        }
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn parse_response_extracts_vectors() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2, 0.3] },
                { "embedding": [0.4, 0.5, 0.6] },
            ]
        });
        let vecs = parse_embedding_response(&json, 3).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!((vecs[1][0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn parse_response_rejects_wrong_dims() {
        let json = serde_json::json!({ "data": [ { "embedding": [0.1, 0.2] } ] });
        let err = parse_embedding_response(&json, 3).unwrap_err();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));
    }

    #[test]
    fn parse_response_rejects_missing_data() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(parse_embedding_response(&json, 3).is_err());
    }
}
