//! Error types shared between the synchronizer and the retriever.

use thiserror::Error;

/// Failure reported by an embedding backend.
///
/// The split between transient and permanent drives the retry policy:
/// transient errors (timeouts, rate limits, server errors, connection
/// failures) are retried with backoff, permanent ones (malformed input,
/// rejected requests, disabled backend) fail the resource immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("transient embedding failure: {0}")]
    Transient(String),
    #[error("permanent embedding failure: {0}")]
    Permanent(String),
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Transient(_))
    }
}

/// Failure of a [`search`](crate::search::HybridRetriever::search) call.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The embedding backend could not embed the query. Retrieval never
    /// falls back to lexical-only ranking.
    #[error("retrieval backend unavailable: {0}")]
    BackendUnavailable(#[source] EmbeddingError),
    /// The vector index could not be read.
    #[error("vector index error: {0}")]
    Index(#[source] anyhow::Error),
}
