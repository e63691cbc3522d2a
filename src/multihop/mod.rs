/// Multi-hop orchestration
///
/// Compound questions are decomposed into sub-questions, each answered from its
/// own hybrid retrieval, and the per-hop answers are fused into one reply.
/// Hops run concurrently but their answers always reach fusion in sub-question order.

use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::config::{GenerationConfig, MultiHopConfig};
use crate::errors::RagError;
use crate::generation::{GenerationError, GenerationOptions, GenerationService};
use crate::prompts::PromptTemplates;
use crate::reason::Citation;
use crate::search::{HybridRetriever, RetrievalMode, RetrievalRequest, ScoredCandidate};

/// Hop answer used when retrieval finds nothing for a sub-question.
pub const NO_CONTENT_ANSWER: &str = "No relevant content found.";

/// Hop answer used when the per-hop generation call fails.
pub const HOP_FAILURE_ANSWER: &str = "Unable to answer this sub-question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPlan {
    DirectSingleHop,
    Decompose,
}

fn conjunction() -> Option<&'static Regex> {
    static CONJUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
    CONJUNCTION
        .get_or_init(|| Regex::new(r"(?i)\s+and\s+").ok())
        .as_ref()
}

fn comparative() -> Option<&'static Regex> {
    static COMPARATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    COMPARATIVE
        .get_or_init(|| {
            Regex::new(r"(?i)\b(compar\w*|relationship|difference|both|between)\b").ok()
        })
        .as_ref()
}

fn numbering() -> Option<&'static Regex> {
    static NUMBERING: OnceLock<Option<Regex>> = OnceLock::new();
    NUMBERING
        .get_or_init(|| Regex::new(r"^\s*\d+\s*[.)]\s*").ok())
        .as_ref()
}

/// Heuristic compound-question detection.
///
/// True when the question joins clauses with "and", asks more than one
/// question, or uses comparative wording.
pub fn is_multi_hop(question: &str) -> bool {
    let joined = conjunction()
        .map(|re| re.split(question).filter(|p| !p.trim().is_empty()).count() > 1)
        .unwrap_or(false);
    if joined {
        return true;
    }

    if question.matches('?').count() > 1 {
        return true;
    }

    comparative().is_some_and(|re| re.is_match(question))
}

pub fn plan_query(question: &str, multihop_enabled: bool) -> QueryPlan {
    if multihop_enabled && is_multi_hop(question) {
        QueryPlan::Decompose
    } else {
        QueryPlan::DirectSingleHop
    }
}

/// Parse a numbered list into sub-questions.
///
/// Numeric prefixes ("1.", "2)") and blank lines are removed. Lines beyond
/// `max_sub_questions` are dropped with a warning.
pub fn parse_sub_questions(text: &str, max_sub_questions: usize) -> Vec<String> {
    let prefix = numbering();
    let mut sub_questions: Vec<String> = text
        .lines()
        .map(|line| match prefix {
            Some(re) => re.replace(line, "").trim().to_string(),
            None => line.trim().to_string(),
        })
        .filter(|line| !line.is_empty())
        .collect();

    if sub_questions.len() > max_sub_questions {
        tracing::warn!(
            parsed = sub_questions.len(),
            max = max_sub_questions,
            "Too many sub-questions, truncating"
        );
        sub_questions.truncate(max_sub_questions);
    }
    sub_questions
}

/// Numbered context window for one hop: `(i) [header]` then the text capped at `char_cap` characters.
pub fn build_hop_context(candidates: &[ScoredCandidate], char_cap: usize) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let header = if c.header.trim().is_empty() {
                "Unknown"
            } else {
                c.header.as_str()
            };
            let text: String = c.text.chars().take(char_cap).collect();
            format!("({}) [{}]\n{}", i + 1, header, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopAnswer {
    pub sub_question: String,
    pub answer: String,
    /// Candidates the hop answer was generated from
    pub sources: Vec<Citation>,
    pub reranked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiHopOutcome {
    pub answer: String,
    pub hops: Vec<HopAnswer>,
    /// Set when decomposition produced no sub-questions
    pub low_quality: bool,
}

/// Parameters shared by every hop of one query.
#[derive(Debug, Clone)]
pub struct HopScope<'a> {
    pub collection_id: &'a str,
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub alpha: f64,
}

pub struct MultiHopOrchestrator {
    retriever: Arc<HybridRetriever>,
    generator: Arc<dyn GenerationService>,
    prompts: Arc<PromptTemplates>,
    decompose_options: GenerationOptions,
    hop_options: GenerationOptions,
    fuse_options: GenerationOptions,
    config: MultiHopConfig,
}

impl MultiHopOrchestrator {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        generator: Arc<dyn GenerationService>,
        prompts: Arc<PromptTemplates>,
        generation: &GenerationConfig,
        config: MultiHopConfig,
    ) -> Self {
        MultiHopOrchestrator {
            retriever,
            generator,
            prompts,
            decompose_options: generation.decompose.clone(),
            hop_options: generation.hop.clone(),
            fuse_options: generation.fuse.clone(),
            config,
        }
    }

    /// One generation call producing the sub-questions. An empty list is a valid result,
    /// including when the model replies with nothing at all.
    pub async fn decompose(&self, question: &str) -> Result<Vec<String>, RagError> {
        let prompt = self.prompts.decompose(question, self.config.max_sub_questions)?;
        let text = match self.generator.generate(&prompt, &self.decompose_options).await {
            Ok(text) => text,
            Err(GenerationError::EmptyResponse) => String::new(),
            Err(e) => return Err(e.into()),
        };

        let sub_questions = parse_sub_questions(&text, self.config.max_sub_questions);
        tracing::info!(
            sub_questions = sub_questions.len(),
            model = %self.decompose_options.model,
            "Question decomposed"
        );
        Ok(sub_questions)
    }

    /// Retrieve, rerank, and answer one sub-question.
    ///
    /// Always yields exactly one answer unless retrieval itself fails.
    pub async fn run_hop(
        &self,
        hop: usize,
        sub_question: &str,
        scope: &HopScope<'_>,
    ) -> Result<HopAnswer, RagError> {
        let request = RetrievalRequest::new(scope.collection_id, sub_question, scope.top_k, scope.alpha)?;
        let outcome = self.retriever.retrieve(&request, scope.mode).await?;

        if outcome.candidates.is_empty() {
            tracing::warn!(hop = hop, sub_question = %sub_question, "No candidates for sub-question");
            return Ok(HopAnswer {
                sub_question: sub_question.to_string(),
                answer: NO_CONTENT_ANSWER.to_string(),
                sources: Vec::new(),
                reranked: outcome.reranked,
            });
        }

        let context = build_hop_context(&outcome.candidates, self.config.context_char_cap);
        let sources = outcome
            .candidates
            .iter()
            .map(|c| Citation {
                chunk_id: c.chunk_id.clone(),
                source_id: c.source_id.clone(),
                header: c.header.clone(),
            })
            .collect();

        let prompt = self.prompts.hop(sub_question, &context)?;
        let answer = match self.generator.generate(&prompt, &self.hop_options).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(hop = hop, error = %e, "Hop generation failed");
                HOP_FAILURE_ANSWER.to_string()
            }
        };

        tracing::debug!(
            hop = hop,
            candidates = outcome.candidates.len(),
            source = outcome.source(),
            "Hop answered"
        );

        Ok(HopAnswer {
            sub_question: sub_question.to_string(),
            answer,
            sources,
            reranked: outcome.reranked,
        })
    }

    /// Final synthesis over all hop answers. No retry; failure is fatal for the query.
    pub async fn fuse(&self, question: &str, hops: &[HopAnswer]) -> Result<String, RagError> {
        let pairs: Vec<(String, String)> = hops
            .iter()
            .map(|h| (h.sub_question.clone(), h.answer.clone()))
            .collect();
        let prompt = self.prompts.fuse(question, &pairs)?;
        Ok(self.generator.generate(&prompt, &self.fuse_options).await?)
    }

    /// Run every hop (up to `hop_concurrency` at a time) and fuse the answers.
    ///
    /// # Errors
    /// `RagError::Cancelled` if `cancel` fires before fusion completes, a retrieval
    /// error from any hop, or `RagError::Synthesis` from the fusion call.
    pub async fn execute(
        &self,
        question: &str,
        sub_questions: &[String],
        scope: &HopScope<'_>,
        cancel: &CancellationToken,
    ) -> Result<MultiHopOutcome, RagError> {
        let low_quality = sub_questions.is_empty();
        if low_quality {
            tracing::warn!("Decomposition produced no sub-questions, fusing without hop answers");
        }

        let hops_future = stream::iter(sub_questions.iter().enumerate())
            .map(|(i, sub_question)| self.run_hop(i + 1, sub_question, scope))
            .buffered(self.config.hop_concurrency.max(1))
            .try_collect::<Vec<HopAnswer>>();

        let hops = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Query cancelled during hop execution");
                return Err(RagError::Cancelled);
            }
            hops = hops_future => hops?,
        };

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Query cancelled during fusion");
                return Err(RagError::Cancelled);
            }
            answer = self.fuse(question, &hops) => answer?,
        };

        Ok(MultiHopOutcome {
            answer,
            hops,
            low_quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(header: &str, text: &str) -> ScoredCandidate {
        ScoredCandidate {
            chunk_id: "c".to_string(),
            source_id: None,
            header: header.to_string(),
            text: text.to_string(),
            lexical_score: None,
            semantic_score: None,
            fused_score: 1.0,
            rerank_score: None,
        }
    }

    #[test]
    fn test_conjunction_triggers_multi_hop() {
        assert!(is_multi_hop("What is the launch date and the budget?"));
        assert!(is_multi_hop("Who signed AND when?"));
    }

    #[test]
    fn test_multiple_question_marks_trigger_multi_hop() {
        assert!(is_multi_hop("Who approved it? When?"));
    }

    #[test]
    fn test_comparative_words_trigger_multi_hop() {
        assert!(is_multi_hop("Compare plan A to plan B"));
        assert!(is_multi_hop("What is the difference in cost?"));
        assert!(is_multi_hop("What links the two teams, if anything, between sprints?"));
    }

    #[test]
    fn test_trigger_examples() {
        assert!(is_multi_hop("Compare the budget and the timeline?"));
        assert!(!is_multi_hop("What is the capital of France?"));
    }

    #[test]
    fn test_comparative_words_match_whole_words_only() {
        assert!(!is_multi_hop("Is the noise bothersome?"));
        assert!(!is_multi_hop("What is the betweenness of node 4?"));
        assert!(is_multi_hop("Which comparisons were made?"));
        assert!(is_multi_hop("Were both audits passed?"));
    }

    #[test]
    fn test_simple_question_is_single_hop() {
        assert!(!is_multi_hop("What is the launch date?"));
        assert!(!is_multi_hop("Who handles brand strategy?"));
        // "and" inside a word is not a conjunction
        assert!(!is_multi_hop("Where is the handbook?"));
    }

    #[test]
    fn test_plan_respects_enabled_flag() {
        let q = "What is the launch date and the budget?";
        assert_eq!(plan_query(q, true), QueryPlan::Decompose);
        assert_eq!(plan_query(q, false), QueryPlan::DirectSingleHop);
        assert_eq!(plan_query("When?", true), QueryPlan::DirectSingleHop);
    }

    #[test]
    fn test_parse_sub_questions_strips_numbering_and_blanks() {
        let parsed = parse_sub_questions("1. What is the launch date?\n\n2) What is the budget?\n   \n", 3);
        assert_eq!(
            parsed,
            vec![
                "What is the launch date?".to_string(),
                "What is the budget?".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_sub_questions_truncates() {
        let parsed = parse_sub_questions("1. a\n2. b\n3. c\n4. d", 3);
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_sub_questions_empty_output() {
        assert!(parse_sub_questions("", 3).is_empty());
        assert!(parse_sub_questions("\n  \n", 3).is_empty());
    }

    #[test]
    fn test_hop_context_numbering_and_cap() {
        let context = build_hop_context(
            &[candidate("Timeline", "Launch date is March 1"), candidate("", "ééééé")],
            3,
        );
        assert_eq!(context, "(1) [Timeline]\nLau\n\n(2) [Unknown]\nééé");
    }
}
