/// OpenAI embedding provider
///
/// Calls the OpenAI Embeddings API using reqwest.
/// Requires HOPRAG_EMBEDDING__OPENAI_API_KEY env var or embedding.openai_api_key in config.

use async_trait::async_trait;
use std::time::Duration;

use super::{EmbeddingError, EmbeddingProvider};

/// Request body for OpenAI Embeddings API
#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

/// Response from OpenAI Embeddings API
#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

/// Single embedding result from OpenAI
#[derive(serde::Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// OpenAI-backed embedding provider.
///
/// Requires a valid API key, validated on construction rather than at embed time.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAIEmbeddingProvider {
    /// Create a new OpenAIEmbeddingProvider.
    ///
    /// # Errors
    /// Returns `EmbeddingError::NotConfigured` if api_key is empty.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "OpenAI API key is required when using the openai embedding provider. \
                 Set HOPRAG_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in hoprag.toml"
                    .to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OpenAIEmbeddingProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbedRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api {
                status,
                message: body,
            });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse API response: {}", e)))?;

        embed_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Generation("API returned empty embedding list".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenAIEmbeddingProvider::new(
            "https://api.openai.com/v1".to_string(),
            "  ".to_string(),
            "text-embedding-3-small".to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(EmbeddingError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_embed_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.5, 0.25] }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAIEmbeddingProvider::new(
            format!("{}/v1", server.uri()),
            "sk-test".to_string(),
            "text-embedding-3-small".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(provider.embed("hello").await.unwrap(), vec![0.5, 0.25]);
    }
}
