//! Persistence error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    /// The resource failed validation. Nothing was written.
    #[error("resource {hash:?} rejected: {reason}")]
    Rejected { hash: String, reason: String },

    /// The catalog lock could not be acquired.
    #[error("catalog write conflict: {0}")]
    CatalogWriteConflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistError {
    pub fn rejected(hash: &str, reason: impl Into<String>) -> Self {
        PersistError::Rejected {
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, PersistError::Rejected { .. })
    }
}
