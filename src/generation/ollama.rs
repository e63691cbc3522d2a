/// Ollama generation provider
///
/// Calls the Ollama /api/generate endpoint with streaming disabled.
/// `max_tokens` maps to Ollama's `num_predict` option.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{GenerationError, GenerationOptions, GenerationService};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaGenerationService {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaGenerationService {
    /// Create a new OllamaGenerationService.
    ///
    /// # Arguments
    /// * `base_url` - Ollama server base URL (e.g., "http://127.0.0.1:11434")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OllamaGenerationService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GenerationService for OllamaGenerationService {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &options.model,
                prompt,
                stream: false,
                options: OllamaOptions {
                    temperature: options.temperature,
                    num_predict: options.max_tokens,
                },
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationError::Api { status, message: body });
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("Failed to parse Ollama response: {}", e)))?;

        let text = generated.response.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
