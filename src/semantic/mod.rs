/// Semantic retrieval: query embedding + external vector similarity search
///
/// The vector index itself is owned by an external service; this module only
/// consumes its read contract `search(collection_key, vector, k)`.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::embedding::EmbeddingProvider;
use crate::errors::RagError;

/// Errors returned by a vector search backend.
#[derive(Debug, Error)]
pub enum VectorSearchError {
    #[error("Vector search request failed: {0}")]
    Request(String),

    #[error("Vector search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Vector search timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for VectorSearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VectorSearchError::Timeout(e.to_string())
        } else {
            VectorSearchError::Request(e.to_string())
        }
    }
}

/// One vector-similarity match. Metadata fields are whatever the index stored at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub chunk_id: String,
    pub score: f64,
    pub header: Option<String>,
    pub text: Option<String>,
    pub source_id: Option<String>,
}

impl SemanticHit {
    pub fn new(chunk_id: impl Into<String>, score: f64) -> Self {
        SemanticHit {
            chunk_id: chunk_id.into(),
            score,
            header: None,
            text: None,
            source_id: None,
        }
    }
}

/// Read contract of the external vector search service.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        collection_key: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SemanticHit>, VectorSearchError>;
}

/// Embeds the query and runs a vector search against the collection.
#[derive(Clone)]
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearch>,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorSearch>) -> Self {
        Self { embedder, index }
    }

    pub async fn search(
        &self,
        collection_key: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SemanticHit>, RagError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(collection_key, &vector, k).await?;
        tracing::debug!(
            collection_key = %collection_key,
            model = self.embedder.model_name(),
            hits = hits.len(),
            "Semantic search complete"
        );
        Ok(hits)
    }
}
