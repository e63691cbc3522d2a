/// Embedding provider trait and supporting types
///
/// Turns a query into a vector before it is sent to the vector search service.
/// Supports Ollama (local, default, no API key) and the OpenAI embeddings API.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failure or unparseable response
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Request exceeded the configured timeout
    #[error("Embedding request timed out: {0}")]
    Timeout(String),

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbeddingError::Timeout(e.to_string())
        } else {
            EmbeddingError::Generation(format!("HTTP request failed: {}", e))
        }
    }
}

/// Core trait for embedding text into float vectors.
///
/// Implementations must be Send + Sync to support use in async contexts
/// and across thread boundaries (e.g., Arc<dyn EmbeddingProvider>).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Return the model name identifier (e.g., "nomic-embed-text:latest").
    fn model_name(&self) -> &str;
}
