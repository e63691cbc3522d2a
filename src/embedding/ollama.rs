/// Ollama embedding provider
///
/// Calls the Ollama /api/embeddings endpoint. No API key required.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingProvider {
    /// Create a new OllamaEmbeddingProvider.
    ///
    /// # Arguments
    /// * `base_url` - Ollama server base URL (e.g., "http://127.0.0.1:11434")
    /// * `model` - Embedding model name (e.g., "nomic-embed-text:latest")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OllamaEmbeddingProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api { status, message: body });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse Ollama response: {}", e)))?;

        if embed_response.embedding.is_empty() {
            return Err(EmbeddingError::Generation(
                "Ollama returned an empty embedding".to_string(),
            ));
        }

        Ok(embed_response.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "nomic-embed-text:latest",
                "prompt": "launch date"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let provider = OllamaEmbeddingProvider::new(
            server.uri(),
            "nomic-embed-text:latest".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let vector = provider.embed("launch date").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let provider =
            OllamaEmbeddingProvider::new(server.uri(), "missing".to_string(), Duration::from_secs(5))
                .unwrap();

        match provider.embed("x").await.unwrap_err() {
            EmbeddingError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embedding": [1.0] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let provider = OllamaEmbeddingProvider::new(
            server.uri(),
            "m".to_string(),
            Duration::from_millis(50),
        )
        .unwrap();

        assert!(matches!(
            provider.embed("x").await.unwrap_err(),
            EmbeddingError::Timeout(_)
        ));
    }
}
