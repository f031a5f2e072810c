//! Engine error taxonomy.
//!
//! Five caller-distinguishable failure kinds flow out of the engine. A
//! grounding refusal is deliberately *not* one of them: "the corpus does not
//! contain the answer" is a normal [`Answer`](crate::models::Answer) with
//! `grounded = false`, while [`EngineError::ServiceUnavailable`] means a
//! dependency could not be reached at all.

/// Errors surfaced by engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Ingestion failed (extraction error, empty document, chunking failure).
    /// The document is marked `Failed` with this reason; re-upload to retry.
    Ingestion(String),
    /// An external dependency (embedding or chat service) exhausted its
    /// retries. The caller may retry the whole operation.
    ServiceUnavailable(String),
    /// The referenced document or session does not exist.
    NotFound(String),
    /// The request's tenant does not own the referenced resource.
    TenantMismatch(String),
    /// The persistence layer failed.
    Storage(String),
}

impl EngineError {
    /// Wrap a storage-layer failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Ingestion(reason) => write!(f, "ingestion failed: {}", reason),
            EngineError::ServiceUnavailable(reason) => {
                write!(f, "service unavailable: {}", reason)
            }
            EngineError::NotFound(what) => write!(f, "not found: {}", what),
            EngineError::TenantMismatch(what) => {
                write!(f, "tenant does not own resource: {}", what)
            }
            EngineError::Storage(reason) => write!(f, "storage error: {}", reason),
        }
    }
}

impl std::error::Error for EngineError {}
