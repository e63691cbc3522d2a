/// Hybrid retriever: lexical + semantic legs, fusion, hydration, rerank
///
/// Both legs fetch a widened candidate pool so fusion has room to reorder, then the
/// fused top-k is hydrated from the chunk store and optionally reranked.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::fusion::fuse_scores;
use super::{RetrievalMode, RetrievalRequest, ScoredCandidate};
use crate::config::RetrievalConfig;
use crate::errors::RagError;
use crate::lexical::LexicalIndexCache;
use crate::rerank::Reranker;
use crate::semantic::{SemanticHit, SemanticRetriever};
use crate::store::ChunkStore;

/// Ordered candidates plus whether the rerank pass actually scored them.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub candidates: Vec<ScoredCandidate>,
    pub reranked: bool,
}

impl RetrievalOutcome {
    /// Provenance label: "hybrid" or "hybrid+rerank".
    pub fn source(&self) -> &'static str {
        if self.reranked {
            "hybrid+rerank"
        } else {
            "hybrid"
        }
    }
}

struct ExpansionRule {
    pattern: Regex,
    terms: String,
}

pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    lexical: Arc<LexicalIndexCache>,
    semantic: SemanticRetriever,
    reranker: Option<Arc<Reranker>>,
    candidate_multiplier: usize,
    min_candidates: usize,
    expansion_rules: Vec<ExpansionRule>,
}

impl HybridRetriever {
    /// # Errors
    /// Returns `RagError::Config` if an expansion rule pattern is not a valid regex.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        lexical: Arc<LexicalIndexCache>,
        semantic: SemanticRetriever,
        reranker: Option<Arc<Reranker>>,
        config: &RetrievalConfig,
    ) -> Result<Self, RagError> {
        let expansion_rules = config
            .expansion_rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|pattern| ExpansionRule {
                        pattern,
                        terms: rule.terms.clone(),
                    })
                    .map_err(|e| {
                        RagError::Config(format!("Invalid expansion pattern '{}': {}", rule.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HybridRetriever {
            store,
            lexical,
            semantic,
            reranker,
            candidate_multiplier: config.candidate_multiplier,
            min_candidates: config.min_candidates,
            expansion_rules,
        })
    }

    /// Per-leg fetch size for a request of `top_k`.
    pub fn candidate_pool(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.candidate_multiplier)
            .max(self.min_candidates)
    }

    /// Query sent to both legs. Document mode appends terms from matching expansion rules.
    pub fn expand_query(&self, question: &str, mode: RetrievalMode) -> String {
        if mode != RetrievalMode::Document {
            return question.to_string();
        }
        let terms: Vec<&str> = self
            .expansion_rules
            .iter()
            .filter(|rule| rule.pattern.is_match(question))
            .map(|rule| rule.terms.as_str())
            .collect();
        if terms.is_empty() {
            question.to_string()
        } else {
            format!("{}. Related to: {}", question, terms.join(", "))
        }
    }

    /// Lexical and semantic hits for the collection, fused to `top_k`, hydrated, and reranked.
    ///
    /// A failure in either leg or in hydration is returned; reranking never fails.
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        mode: RetrievalMode,
    ) -> Result<RetrievalOutcome, RagError> {
        let collection_key = mode.collection_key(&request.collection_id);
        let query = self.expand_query(&request.query_text, mode);
        let pool = self.candidate_pool(request.top_k);

        let (semantic_hits, lexical_hits) = tokio::try_join!(
            self.semantic.search(&collection_key, &query, pool),
            self.lexical.search(&collection_key, &query, pool),
        )?;

        tracing::debug!(
            collection_id = %collection_key,
            semantic = semantic_hits.len(),
            lexical = lexical_hits.len(),
            pool = pool,
            "Retrieval legs complete"
        );

        if semantic_hits.is_empty() && lexical_hits.is_empty() {
            tracing::info!(collection_id = %collection_key, "No results from either retrieval leg");
            return Ok(RetrievalOutcome {
                candidates: Vec::new(),
                reranked: false,
            });
        }

        let fused = fuse_scores(
            &semantic_hits
                .iter()
                .map(|h| (h.chunk_id.clone(), h.score))
                .collect::<Vec<_>>(),
            &lexical_hits
                .iter()
                .map(|h| (h.chunk_id.clone(), h.score))
                .collect::<Vec<_>>(),
            request.alpha,
            request.top_k,
        );

        let ids: Vec<String> = fused.iter().map(|f| f.chunk_id.clone()).collect();
        let stored: HashMap<String, _> = self
            .store
            .get_chunks(&collection_key, &ids)
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to hydrate candidates: {}", e)))?
            .into_iter()
            .map(|chunk| (chunk.id.clone(), chunk))
            .collect();

        let metadata: HashMap<&str, &SemanticHit> = semantic_hits
            .iter()
            .map(|h| (h.chunk_id.as_str(), h))
            .collect();
        let lexical_headers: HashMap<&str, &str> = lexical_hits
            .iter()
            .map(|h| (h.chunk_id.as_str(), h.header.as_str()))
            .collect();

        let mut candidates = Vec::with_capacity(fused.len());
        for f in fused {
            let hit = metadata.get(f.chunk_id.as_str());
            let (header, text, source_id) = match stored.get(&f.chunk_id) {
                Some(chunk) => (
                    chunk.header.clone(),
                    chunk.text.clone(),
                    Some(chunk.source_id.clone()),
                ),
                None => (
                    hit.and_then(|h| h.header.clone())
                        .or_else(|| lexical_headers.get(f.chunk_id.as_str()).map(|h| h.to_string()))
                        .unwrap_or_default(),
                    hit.and_then(|h| h.text.clone()).unwrap_or_default(),
                    hit.and_then(|h| h.source_id.clone()),
                ),
            };

            if text.trim().is_empty() {
                tracing::debug!(chunk_id = %f.chunk_id, "Dropping candidate without text");
                continue;
            }

            candidates.push(ScoredCandidate {
                chunk_id: f.chunk_id,
                source_id,
                header,
                text,
                lexical_score: f.lexical_score,
                semantic_score: f.semantic_score,
                fused_score: f.fused_score,
                rerank_score: None,
            });
        }

        let mut reranked = false;
        if let Some(reranker) = &self.reranker {
            candidates = reranker.rerank(&request.query_text, candidates).await;
            reranked = candidates.iter().any(|c| c.rerank_score.is_some());
        }
        candidates.truncate(request.top_k);

        tracing::info!(
            collection_id = %collection_key,
            candidates = candidates.len(),
            reranked = reranked,
            "Hybrid retrieval complete"
        );

        Ok(RetrievalOutcome { candidates, reranked })
    }

    /// The lexical index cache, for explicit invalidation after ingestion.
    pub fn lexical_cache(&self) -> &Arc<LexicalIndexCache> {
        &self.lexical
    }
}
