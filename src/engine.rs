/// Query entry point
///
/// Routes a question either straight through the single-hop pipeline
/// (retrieve, compress if needed, reason, resolve citations) or through the
/// multi-hop orchestrator. Each query runs inside a span carrying its `query_id`.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::compress::{ContextChunk, ContextCompressor};
use crate::config::{Config, RetrievalConfig};
use crate::errors::RagError;
use crate::generation::GenerationService;
use crate::multihop::{plan_query, HopAnswer, HopScope, MultiHopOrchestrator, QueryPlan};
use crate::prompts::PromptTemplates;
use crate::reason::{resolve_citations, AnswerSynthesizer, Citation};
use crate::search::{HybridRetriever, RetrievalMode, RetrievalOutcome, RetrievalRequest};

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub query_id: String,
    pub mode: RetrievalMode,
    pub strategy: QueryPlan,
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Per-hop answers in sub-question order (empty for single-hop)
    pub hops: Vec<HopAnswer>,
    pub compressor_used: bool,
    pub reranked: bool,
    /// Multi-hop ran with zero sub-questions
    pub low_quality: bool,
}

pub struct RagEngine {
    retriever: Arc<HybridRetriever>,
    compressor: ContextCompressor,
    synthesizer: AnswerSynthesizer,
    orchestrator: MultiHopOrchestrator,
    retrieval: RetrievalConfig,
    token_budget: usize,
    multihop_enabled: bool,
}

impl RagEngine {
    /// Assemble the engine from a retriever and a generation backend.
    ///
    /// # Errors
    /// `RagError::Template` if a configured prompt override does not compile.
    pub fn new(
        retriever: Arc<HybridRetriever>,
        generator: Arc<dyn GenerationService>,
        config: &Config,
    ) -> Result<Self, RagError> {
        let prompts = Arc::new(PromptTemplates::new(&config.prompts)?);
        let generation = &config.generation;

        Ok(RagEngine {
            compressor: ContextCompressor::new(
                generator.clone(),
                prompts.clone(),
                generation.compress.clone(),
            ),
            synthesizer: AnswerSynthesizer::new(
                generator.clone(),
                prompts.clone(),
                generation.reason.clone(),
            ),
            orchestrator: MultiHopOrchestrator::new(
                retriever.clone(),
                generator,
                prompts,
                generation,
                config.multihop.clone(),
            ),
            retriever,
            retrieval: config.retrieval.clone(),
            token_budget: config.compression.token_budget,
            multihop_enabled: config.multihop.enabled,
        })
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    /// Hybrid retrieval only, with the configured defaults for `top_k` and `alpha`.
    pub async fn retrieve(
        &self,
        collection_id: &str,
        query: &str,
        mode: RetrievalMode,
        top_k: Option<usize>,
        alpha: Option<f64>,
    ) -> Result<RetrievalOutcome, RagError> {
        let request = RetrievalRequest::new(
            collection_id,
            query,
            top_k.unwrap_or(self.retrieval.top_k),
            alpha.unwrap_or(self.retrieval.alpha),
        )?;
        self.retriever.retrieve(&request, mode).await
    }

    /// Answer a question against a collection.
    ///
    /// Compound questions are decomposed when multi-hop is enabled; if
    /// decomposition itself fails the question is answered single-hop.
    pub async fn answer(
        &self,
        collection_id: &str,
        question: &str,
        mode: RetrievalMode,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::validation("question", "question must not be empty"));
        }

        let query_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "query",
            query_id = %query_id,
            collection_id = %collection_id,
            mode = ?mode
        );

        async {
            let plan = plan_query(question, self.multihop_enabled);
            tracing::info!(strategy = ?plan, "Answering question");

            let result = match plan {
                QueryPlan::Decompose => {
                    self.answer_multi_hop(&query_id, collection_id, question, mode, cancel)
                        .await
                }
                QueryPlan::DirectSingleHop => {
                    self.answer_single_hop(&query_id, collection_id, question, mode, cancel)
                        .await
                }
            };

            match &result {
                Ok(answer) => tracing::info!(
                    strategy = ?answer.strategy,
                    citations = answer.citations.len(),
                    hops = answer.hops.len(),
                    "Query complete"
                ),
                Err(e) => tracing::warn!(error = %e, "Query failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn answer_multi_hop(
        &self,
        query_id: &str,
        collection_id: &str,
        question: &str,
        mode: RetrievalMode,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer, RagError> {
        let decomposed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            decomposed = self.orchestrator.decompose(question) => decomposed,
        };

        let sub_questions = match decomposed {
            Ok(sub_questions) => sub_questions,
            Err(e) => {
                tracing::warn!(error = %e, "Decomposition failed, answering single-hop");
                return self
                    .answer_single_hop(query_id, collection_id, question, mode, cancel)
                    .await;
            }
        };

        let scope = HopScope {
            collection_id,
            mode,
            top_k: self.retrieval.top_k,
            alpha: self.retrieval.alpha,
        };
        let outcome = self
            .orchestrator
            .execute(question, &sub_questions, &scope, cancel)
            .await?;

        let mut citations: Vec<Citation> = Vec::new();
        for source in outcome.hops.iter().flat_map(|h| h.sources.iter()) {
            if !citations.iter().any(|c| c.chunk_id == source.chunk_id) {
                citations.push(source.clone());
            }
        }

        let reranked = outcome.hops.iter().any(|h| h.reranked);

        Ok(RagAnswer {
            query_id: query_id.to_string(),
            mode,
            strategy: QueryPlan::Decompose,
            answer: outcome.answer,
            citations,
            hops: outcome.hops,
            compressor_used: false,
            reranked,
            low_quality: outcome.low_quality,
        })
    }

    async fn answer_single_hop(
        &self,
        query_id: &str,
        collection_id: &str,
        question: &str,
        mode: RetrievalMode,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer, RagError> {
        let pipeline = async {
            let outcome = self.retrieve(collection_id, question, mode, None, None).await?;

            if outcome.candidates.is_empty() {
                tracing::info!("No candidates retrieved, returning fallback answer");
                return Ok(RagAnswer {
                    query_id: query_id.to_string(),
                    mode,
                    strategy: QueryPlan::DirectSingleHop,
                    answer: mode.fallback_answer().to_string(),
                    citations: Vec::new(),
                    hops: Vec::new(),
                    compressor_used: false,
                    reranked: outcome.reranked,
                    low_quality: false,
                });
            }

            let chunks: Vec<ContextChunk> = outcome.candidates.iter().map(ContextChunk::from).collect();
            let compressed = self
                .compressor
                .compress_if_needed(question, &chunks, self.token_budget)
                .await;

            let answer = self.synthesizer.reason(question, &compressed.context).await?;
            let citations = resolve_citations(&answer.citation_ids, &outcome.candidates);

            Ok::<_, RagError>(RagAnswer {
                query_id: query_id.to_string(),
                mode,
                strategy: QueryPlan::DirectSingleHop,
                answer: answer.text,
                citations,
                hops: Vec::new(),
                compressor_used: compressed.compressor_used,
                reranked: outcome.reranked,
                low_quality: false,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RagError::Cancelled),
            result = pipeline => result,
        }
    }
}
