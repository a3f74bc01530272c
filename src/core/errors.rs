use thiserror::Error;

/// Error taxonomy for the retrieval pipeline and its collaborators.
///
/// Variants split along recovery lines: configuration and data-integrity
/// errors are fatal and reported immediately; `IndexNotReady` is transient
/// and safe to retry after backoff; provider faults (`EmbeddingFailed`,
/// `GenerationFailed`) are recovered into user-safe text at the pipeline
/// boundary with the root cause logged for operators.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no documents to index")]
    EmptyCorpus,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },
    #[error("incompatible index version: {0}")]
    IncompatibleIndexVersion(String),
    #[error("index is not ready")]
    IndexNotReady,
    #[error("embedding request failed: {0}")]
    EmbeddingFailed(String),
    #[error("generation request failed: {0}")]
    GenerationFailed(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    /// Stable, user-presentable text for each variant.
    ///
    /// Internal detail (sqlx/reqwest messages, file paths) never crosses
    /// the user boundary; it stays in the `Display` impl and the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            RagError::InvalidConfig(_) => "The configuration is invalid.",
            RagError::EmptyCorpus => "There are no documents to index.",
            RagError::EmbeddingDimensionMismatch { .. } => {
                "The document index does not match the configured embedding model."
            }
            RagError::IncompatibleIndexVersion(_) => {
                "The saved document index is incompatible and must be rebuilt."
            }
            RagError::IndexNotReady => {
                "The document index is still being prepared. Please try again shortly."
            }
            RagError::EmbeddingFailed(_) | RagError::GenerationFailed(_) => {
                "Sorry, there was a problem processing your question."
            }
            RagError::SessionNotFound(_) => "Session not found.",
            RagError::Internal(_) => "An internal error occurred.",
        }
    }

    /// True for errors a caller may retry after backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::IndexNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_internal_detail() {
        let err = RagError::Internal("sqlite: disk I/O error at /var/lib/x.db".to_string());
        assert!(!err.user_message().contains("sqlite"));
        assert!(!err.user_message().contains("/var"));
    }

    #[test]
    fn only_index_not_ready_is_transient() {
        assert!(RagError::IndexNotReady.is_transient());
        assert!(!RagError::EmptyCorpus.is_transient());
        assert!(!RagError::GenerationFailed("timeout".into()).is_transient());
    }
}
