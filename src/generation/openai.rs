/// OpenAI generation provider
///
/// Calls the OpenAI Chat Completions API with the prompt as a single user message.
/// Requires HOPRAG_GENERATION__OPENAI_API_KEY or generation.openai_api_key in config.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{GenerationError, GenerationOptions, GenerationService};

/// Request body for OpenAI Chat Completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response from OpenAI Chat Completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAIGenerationService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAIGenerationService {
    /// Create a new OpenAIGenerationService.
    ///
    /// # Errors
    /// Returns `GenerationError::NotConfigured` if api_key is empty.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "OpenAI API key is required when using the openai generation provider. \
                 Set HOPRAG_GENERATION__OPENAI_API_KEY or generation.openai_api_key in hoprag.toml"
                    .to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OpenAIGenerationService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationService for OpenAIGenerationService {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &options.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
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

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("Failed to parse API response: {}", e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let text = content.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
