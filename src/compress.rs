/// Context compression under a token budget
///
/// Joins candidate texts as `[chunk_id] text` lines. Only when the estimate exceeds
/// the budget is a summarization call made, and any failure of that call falls
/// back to the uncompressed text.

use serde::Serialize;
use std::sync::Arc;

use crate::errors::RagError;
use crate::generation::{GenerationOptions, GenerationService};
use crate::prompts::PromptTemplates;
use crate::search::ScoredCandidate;

/// A chunk as it appears in the final context window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChunk {
    pub chunk_id: String,
    pub header: String,
    pub text: String,
}

impl From<&ScoredCandidate> for ContextChunk {
    fn from(c: &ScoredCandidate) -> Self {
        ContextChunk {
            chunk_id: c.chunk_id.clone(),
            header: c.header.clone(),
            text: c.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedContext {
    pub context: String,
    pub compressor_used: bool,
    pub token_estimate: usize,
}

/// `ceil(word_count * 1.33)`, computed in integers.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * 133 + 99) / 100
}

pub fn join_context(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[{}] {}", c.chunk_id, c.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ContextCompressor {
    generator: Arc<dyn GenerationService>,
    prompts: Arc<PromptTemplates>,
    options: GenerationOptions,
}

impl ContextCompressor {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        prompts: Arc<PromptTemplates>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            generator,
            prompts,
            options,
        }
    }

    /// Joined context, summarized only when it exceeds `token_budget`.
    pub async fn compress_if_needed(
        &self,
        query: &str,
        chunks: &[ContextChunk],
        token_budget: usize,
    ) -> CompressedContext {
        let joined = join_context(chunks);
        let estimate = estimate_tokens(&joined);

        if estimate <= token_budget {
            tracing::debug!(tokens = estimate, budget = token_budget, "Compression skipped");
            return CompressedContext {
                context: joined,
                compressor_used: false,
                token_estimate: estimate,
            };
        }

        tracing::info!(tokens = estimate, budget = token_budget, "Compressing context");

        match self.summarize(query, chunks).await {
            Ok(compressed) => {
                let token_estimate = estimate_tokens(&compressed);
                tracing::info!(
                    before = estimate,
                    after = token_estimate,
                    model = %self.options.model,
                    "Context compressed"
                );
                CompressedContext {
                    context: compressed,
                    compressor_used: true,
                    token_estimate,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Compression failed, using uncompressed context");
                CompressedContext {
                    context: joined,
                    compressor_used: false,
                    token_estimate: estimate,
                }
            }
        }
    }

    async fn summarize(&self, query: &str, chunks: &[ContextChunk]) -> Result<String, RagError> {
        let prompt = self.prompts.compress(query, chunks)?;
        let text = self
            .generator
            .generate(&prompt, &self.options)
            .await
            .map_err(|e| RagError::CompressionFailed(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(RagError::CompressionFailed("empty summary".to_string()));
        }
        Ok(text)
    }
}
