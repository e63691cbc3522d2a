/// Domain-specific error types for hoprag
///
/// Irrecoverable failures (storage, final synthesis) are returned to the caller.
/// `RerankUnavailable` and `CompressionFailed` are produced inside their components,
/// logged, and replaced by the documented fallback before anything is returned.

#[derive(Debug, Clone, thiserror::Error)]
pub enum RagError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index build failed for collection {collection_id}: {message}")]
    IndexBuild {
        collection_id: String,
        message: String,
    },

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Reranker unavailable: {0}")]
    RerankUnavailable(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Query cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}

impl From<minijinja::Error> for RagError {
    fn from(e: minijinja::Error) -> Self {
        RagError::Template(e.to_string())
    }
}

impl From<crate::embedding::EmbeddingError> for RagError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        RagError::Retrieval(e.to_string())
    }
}

impl From<crate::semantic::VectorSearchError> for RagError {
    fn from(e: crate::semantic::VectorSearchError) -> Self {
        RagError::Retrieval(e.to_string())
    }
}

impl From<crate::rerank::RerankError> for RagError {
    fn from(e: crate::rerank::RerankError) -> Self {
        RagError::RerankUnavailable(e.to_string())
    }
}

impl From<crate::generation::GenerationError> for RagError {
    fn from(e: crate::generation::GenerationError) -> Self {
        RagError::Synthesis(e.to_string())
    }
}

impl RagError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use hoprag::errors::RagError;
    /// let err = RagError::validation("top_k", "top_k must be greater than zero");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        RagError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Wrap any storage or tokenizer failure as an index build failure for a collection.
    pub fn index_build(collection_id: &str, message: impl Into<String>) -> Self {
        RagError::IndexBuild {
            collection_id: collection_id.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;

    #[test]
    fn test_generation_error_converts_to_synthesis() {
        let err: RagError = GenerationError::Timeout("reason".to_string()).into();
        match err {
            RagError::Synthesis(message) => assert!(message.contains("timed out")),
            other => panic!("expected Synthesis, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_helper_sets_field() {
        let err = RagError::validation("alpha", "alpha must be within [0, 1]");
        assert!(matches!(err, RagError::Validation { field: Some(ref f), .. } if f == "alpha"));
    }
}
