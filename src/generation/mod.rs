/// Text generation provider trait and per-call-site options
///
/// Four call sites use generation: decomposition, per-hop answers, context
/// compression, and final synthesis. Each carries its own `GenerationOptions`
/// so a cheap model can decompose while a stronger one synthesizes.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Generation request timed out: {0}")]
    Timeout(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout(e.to_string())
        } else {
            GenerationError::Request(format!("HTTP request failed: {}", e))
        }
    }
}

/// Model configuration for one generation call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model: String,

    /// Output length cap; `None` leaves it to the provider.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.2
}

impl GenerationOptions {
    pub fn new(model: &str) -> Self {
        GenerationOptions {
            model: model.to_string(),
            max_tokens: None,
            temperature: default_temperature(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Core trait for prompt-in, text-out generation.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a completion for `prompt`. Implementations return the raw text,
    /// trimmed of surrounding whitespace.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, GenerationError>;

    /// Provider identifier for logs (e.g., "ollama").
    fn provider_name(&self) -> &str;
}

/// Issue a one-token generation per distinct model so the first real query
/// does not pay the model load time.
///
/// Returns the models that failed to warm up; failures are logged, not fatal.
pub async fn warm_up(service: &dyn GenerationService, call_sites: &[&GenerationOptions]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut failed = Vec::new();

    for options in call_sites {
        if !seen.insert(options.model.clone()) {
            continue;
        }
        let probe = GenerationOptions {
            max_tokens: Some(1),
            ..(*options).clone()
        };
        let start = std::time::Instant::now();
        match service.generate("ping", &probe).await {
            Ok(_) | Err(GenerationError::EmptyResponse) => {
                tracing::info!(
                    model = %options.model,
                    provider = service.provider_name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model warmed up"
                );
            }
            Err(e) => {
                tracing::warn!(model = %options.model, error = %e, "Model warm-up failed");
                failed.push(options.model.clone());
            }
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingService {
        calls: Mutex<Vec<(String, Option<u32>)>>,
        fail_model: Option<String>,
    }

    #[async_trait]
    impl GenerationService for RecordingService {
        async fn generate(&self, _prompt: &str, options: &GenerationOptions) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((options.model.clone(), options.max_tokens));
            if self.fail_model.as_deref() == Some(options.model.as_str()) {
                return Err(GenerationError::Api {
                    status: 404,
                    message: "model not found".to_string(),
                });
            }
            Ok("ok".to_string())
        }

        fn provider_name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_options_builder() {
        let options = GenerationOptions::new("m").with_max_tokens(800);
        assert_eq!(options.model, "m");
        assert_eq!(options.max_tokens, Some(800));
        assert!((options.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_warm_up_once_per_model_with_single_token() {
        let service = RecordingService {
            calls: Mutex::new(Vec::new()),
            fail_model: Some("big".to_string()),
        };
        let small = GenerationOptions::new("small");
        let big = GenerationOptions::new("big").with_max_tokens(800);

        let failed = warm_up(&service, &[&small, &big, &small]).await;

        assert_eq!(failed, vec!["big".to_string()]);
        assert_eq!(
            *service.calls.lock().unwrap(),
            vec![("small".to_string(), Some(1)), ("big".to_string(), Some(1))]
        );
    }
}
