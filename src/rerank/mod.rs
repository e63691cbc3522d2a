/// Cross-encoder reranking with configurable bonus rules
///
/// The `RerankerService` trait is the external scoring contract. `Reranker` merges
/// the returned scores back onto candidates, applies the header and domain bonuses,
/// and degrades to the incoming order whenever scoring is not possible.

pub mod http;

use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{BonusRule, RerankerConfig};
use crate::errors::RagError;
use crate::search::ScoredCandidate;

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("Rerank request failed: {0}")]
    Request(String),

    #[error("Rerank API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rerank request timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for RerankError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RerankError::Timeout(e.to_string())
        } else {
            RerankError::Request(e.to_string())
        }
    }
}

/// Relevance score for one passage, keyed by the passage text as sent.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct RerankScore {
    pub text: String,
    #[serde(default)]
    pub score: f64,
}

/// External cross-encoder scoring of (query, passage) pairs.
#[async_trait]
pub trait RerankerService: Send + Sync {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RerankScore>, RerankError>;
}

struct CompiledRule {
    pattern: Regex,
    bonus: f64,
}

fn compile_rules(rules: &[BonusRule]) -> Result<Vec<CompiledRule>, RagError> {
    rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|pattern| CompiledRule {
                    pattern,
                    bonus: rule.bonus,
                })
                .map_err(|e| {
                    RagError::Config(format!("Invalid rerank rule pattern '{}': {}", rule.pattern, e))
                })
        })
        .collect()
}

pub struct Reranker {
    service: Arc<dyn RerankerService>,
    header_rules: Vec<CompiledRule>,
    domain_rules: Vec<CompiledRule>,
}

impl Reranker {
    /// # Errors
    /// Returns `RagError::Config` if a bonus rule pattern is not a valid regex.
    pub fn new(service: Arc<dyn RerankerService>, config: &RerankerConfig) -> Result<Self, RagError> {
        Ok(Reranker {
            service,
            header_rules: compile_rules(&config.header_rules)?,
            domain_rules: compile_rules(&config.domain_rules)?,
        })
    }

    /// Reorder candidates by cross-encoder relevance plus bonuses.
    ///
    /// Never fails: on an empty query, no usable passages, a service error, or an
    /// empty response the candidates come back in their incoming order.
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            tracing::warn!("No candidates to rerank");
            return candidates;
        }
        if query.trim().is_empty() {
            tracing::warn!("Empty query, skipping rerank");
            return candidates;
        }

        match self.try_rerank(query, &candidates).await {
            Ok(reranked) => reranked,
            Err(e) => {
                tracing::warn!(error = %e, candidates = candidates.len(), "Rerank skipped, keeping fused order");
                candidates
            }
        }
    }

    async fn try_rerank(
        &self,
        query: &str,
        candidates: &[ScoredCandidate],
    ) -> Result<Vec<ScoredCandidate>, RagError> {
        let mut seen = HashSet::new();
        let passages: Vec<String> = candidates
            .iter()
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .map(str::to_string)
            .collect();

        if passages.is_empty() {
            return Err(RagError::RerankUnavailable("all candidate texts are empty".to_string()));
        }

        let scores = self.service.rerank(query, &passages).await?;
        if scores.is_empty() {
            return Err(RagError::RerankUnavailable("reranker returned no results".to_string()));
        }

        let by_text: HashMap<&str, f64> = scores
            .iter()
            .map(|s| (s.text.trim(), s.score))
            .collect();

        let mut scored = Vec::new();
        let mut unscored = Vec::new();
        for candidate in candidates {
            match by_text.get(candidate.text.trim()) {
                Some(&base) => {
                    let mut candidate = candidate.clone();
                    candidate.rerank_score = Some(base + self.bonus(query, &candidate));
                    scored.push(candidate);
                }
                None => unscored.push(candidate.clone()),
            }
        }

        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            scored = scored.len(),
            unscored = unscored.len(),
            "Rerank complete"
        );

        scored.extend(unscored);
        Ok(scored)
    }

    /// Sum of the header and domain bonuses that apply to a candidate.
    pub fn bonus(&self, query: &str, candidate: &ScoredCandidate) -> f64 {
        let header = candidate.header.to_lowercase();
        let mut bonus = 0.0;

        for rule in &self.header_rules {
            if let Some(m) = rule.pattern.find(query) {
                if !header.is_empty() && header.contains(&m.as_str().to_lowercase()) {
                    bonus += rule.bonus;
                }
            }
        }
        for rule in &self.domain_rules {
            if rule.pattern.is_match(&candidate.text) {
                bonus += rule.bonus;
            }
        }

        bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn candidate(id: &str, header: &str, text: &str) -> ScoredCandidate {
        ScoredCandidate {
            chunk_id: id.to_string(),
            source_id: None,
            header: header.to_string(),
            text: text.to_string(),
            lexical_score: None,
            semantic_score: None,
            fused_score: 0.5,
            rerank_score: None,
        }
    }

    /// Scores passages from a fixed table and records what it was sent.
    struct TableService {
        table: HashMap<String, f64>,
        sent: Mutex<Vec<String>>,
    }

    impl TableService {
        fn new(pairs: &[(&str, f64)]) -> Self {
            TableService {
                table: pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RerankerService for TableService {
        async fn rerank(&self, _query: &str, passages: &[String]) -> Result<Vec<RerankScore>, RerankError> {
            self.sent.lock().unwrap().extend(passages.iter().cloned());
            Ok(passages
                .iter()
                .filter_map(|p| {
                    self.table.get(p).map(|s| RerankScore {
                        text: p.clone(),
                        score: *s,
                    })
                })
                .collect())
        }
    }

    struct DownService;

    #[async_trait]
    impl RerankerService for DownService {
        async fn rerank(&self, _query: &str, _passages: &[String]) -> Result<Vec<RerankScore>, RerankError> {
            Err(RerankError::Request("connection refused".to_string()))
        }
    }

    fn ids(candidates: &[ScoredCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_rerank_orders_by_score() {
        let service = Arc::new(TableService::new(&[("alpha", 0.1), ("beta", 0.9), ("gamma", 0.5)]));
        let reranker = Reranker::new(service, &RerankerConfig::default()).unwrap();
        let out = reranker
            .rerank(
                "q",
                vec![candidate("1", "", "alpha"), candidate("2", "", "beta"), candidate("3", "", "gamma")],
            )
            .await;
        assert_eq!(ids(&out), vec!["2", "3", "1"]);
        assert_eq!(out[0].rerank_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_service_error_keeps_order() {
        let reranker = Reranker::new(Arc::new(DownService), &RerankerConfig::default()).unwrap();
        let input = vec![candidate("1", "", "a"), candidate("2", "", "b")];
        let out = reranker.rerank("q", input.clone()).await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_empty_query_keeps_order() {
        let service = Arc::new(TableService::new(&[("a", 0.1), ("b", 0.9)]));
        let reranker = Reranker::new(service.clone(), &RerankerConfig::default()).unwrap();
        let input = vec![candidate("1", "", "a"), candidate("2", "", "b")];
        let out = reranker.rerank("   ", input.clone()).await;
        assert_eq!(out, input);
        assert!(service.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_duplicate_texts_excluded_from_request() {
        let service = Arc::new(TableService::new(&[("dup", 0.3), ("solo", 0.8)]));
        let reranker = Reranker::new(service.clone(), &RerankerConfig::default()).unwrap();
        let out = reranker
            .rerank(
                "q",
                vec![
                    candidate("1", "", "dup"),
                    candidate("2", "", "  "),
                    candidate("3", "", "dup "),
                    candidate("4", "", "solo"),
                ],
            )
            .await;

        assert_eq!(*service.sent.lock().unwrap(), vec!["dup".to_string(), "solo".to_string()]);
        // Both duplicates carry the shared score; the empty one trails unscored.
        assert_eq!(ids(&out), vec!["4", "1", "3", "2"]);
        assert_eq!(out[3].rerank_score, None);
    }

    #[tokio::test]
    async fn test_all_empty_texts_keeps_order() {
        let service = Arc::new(TableService::new(&[]));
        let reranker = Reranker::new(service.clone(), &RerankerConfig::default()).unwrap();
        let input = vec![candidate("1", "", ""), candidate("2", "", " ")];
        assert_eq!(reranker.rerank("q", input.clone()).await, input);
        assert!(service.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_bonus_applies_when_section_named() {
        let service = Arc::new(TableService::new(&[("intro text", 0.5), ("scope text", 0.3)]));
        let reranker = Reranker::new(service, &RerankerConfig::default()).unwrap();
        let out = reranker
            .rerank(
                "What does Section 4 require?",
                vec![
                    candidate("1", "Section 1 Intro", "intro text"),
                    candidate("2", "SECTION 4 Scope", "scope text"),
                ],
            )
            .await;
        assert_eq!(ids(&out), vec!["2", "1"]);
        assert!((out[0].rerank_score.unwrap() - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_domain_bonus_from_config() {
        let config = RerankerConfig {
            domain_rules: vec![BonusRule {
                pattern: "(?i)factory|predictive maintenance".to_string(),
                bonus: 0.6,
            }],
            ..RerankerConfig::default()
        };
        let service = Arc::new(TableService::new(&[("office memo", 0.5), ("Factory uptime report", 0.2)]));
        let reranker = Reranker::new(service, &config).unwrap();
        let out = reranker
            .rerank(
                "uptime",
                vec![candidate("1", "", "office memo"), candidate("2", "", "Factory uptime report")],
            )
            .await;
        assert_eq!(ids(&out), vec!["2", "1"]);
    }

    #[test]
    fn test_invalid_rule_pattern_rejected() {
        let config = RerankerConfig {
            header_rules: vec![BonusRule {
                pattern: "(unclosed".to_string(),
                bonus: 1.0,
            }],
            ..RerankerConfig::default()
        };
        let result = Reranker::new(Arc::new(DownService), &config);
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
