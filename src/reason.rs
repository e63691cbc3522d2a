/// Answer synthesis and citation extraction
///
/// The model is asked to close its reply with `Citations: [id1, id2]`. Parsing is
/// best-effort: a missing or malformed marker yields no citations, never an error.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::errors::RagError;
use crate::generation::{GenerationOptions, GenerationService};
use crate::prompts::PromptTemplates;
use crate::search::ScoredCandidate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citation_ids: Vec<String>,
}

/// A citation id resolved against the retrieved candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source_id: Option<String>,
    pub header: String,
}

fn citation_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"(?i)Citations:\s*\[([^\]]+)\]").ok())
        .as_ref()
}

/// Split raw model output into answer text and cited ids.
///
/// The marker line is removed from the answer. Ids are trimmed, optional
/// surrounding brackets or quotes are stripped, and duplicates dropped.
pub fn parse_citations(raw: &str) -> (String, Vec<String>) {
    let Some(marker) = citation_marker() else {
        return (raw.trim().to_string(), Vec::new());
    };
    let Some(captures) = marker.captures(raw) else {
        return (raw.trim().to_string(), Vec::new());
    };

    let mut seen = HashSet::new();
    let ids: Vec<String> = captures[1]
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'' || c == '[' || c == ']').trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(str::to_string)
        .collect();

    let text = marker.replace(raw, "").trim().to_string();
    (text, ids)
}

/// Map cited ids back to candidate metadata. Unknown ids are dropped silently.
pub fn resolve_citations(ids: &[String], candidates: &[ScoredCandidate]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| {
            candidates.iter().find(|c| &c.chunk_id == id).map(|c| Citation {
                chunk_id: c.chunk_id.clone(),
                source_id: c.source_id.clone(),
                header: c.header.clone(),
            })
        })
        .collect()
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationService>,
    prompts: Arc<PromptTemplates>,
    options: GenerationOptions,
}

impl AnswerSynthesizer {
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

    /// Generate an answer for `query` from `context` and extract its citation ids.
    ///
    /// # Errors
    /// `RagError::Synthesis` when the generation call fails or returns nothing.
    pub async fn reason(&self, query: &str, context: &str) -> Result<Answer, RagError> {
        let prompt = self.prompts.reason(query, context)?;
        let raw = self.generator.generate(&prompt, &self.options).await?;

        let (text, citation_ids) = parse_citations(&raw);
        if text.is_empty() {
            return Err(RagError::Synthesis("model returned only a citation marker".to_string()));
        }

        tracing::debug!(
            model = %self.options.model,
            chars = text.len(),
            citations = citation_ids.len(),
            "Answer synthesized"
        );

        Ok(Answer { text, citation_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;
    use crate::generation::GenerationError;
    use async_trait::async_trait;

    fn candidate(id: &str, header: &str) -> ScoredCandidate {
        ScoredCandidate {
            chunk_id: id.to_string(),
            source_id: Some(format!("file-{}", id)),
            header: header.to_string(),
            text: "t".to_string(),
            lexical_score: None,
            semantic_score: None,
            fused_score: 1.0,
            rerank_score: None,
        }
    }

    #[test]
    fn test_parse_citations_extracts_ids_and_strips_marker() {
        let (text, ids) = parse_citations("Launch is March 1.\nCitations: [c1, c3]");
        assert_eq!(text, "Launch is March 1.");
        assert_eq!(ids, vec!["c1".to_string(), "c3".to_string()]);
    }

    #[test]
    fn test_parse_citations_case_insensitive_and_quoted() {
        let (_, ids) = parse_citations("answer\ncitations:[ \"a\" , 'b', a ]");
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_marker_means_no_citations() {
        let (text, ids) = parse_citations("  Plain answer with no marker. ");
        assert_eq!(text, "Plain answer with no marker.");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_malformed_marker_means_no_citations() {
        let (_, ids) = parse_citations("answer\nCitations: c1, c2");
        assert!(ids.is_empty());
        let (_, ids) = parse_citations("answer\nCitations: []");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_resolve_drops_unknown_ids() {
        let candidates = vec![candidate("c1", "Timeline"), candidate("c2", "Finance")];
        let ids = vec!["c2".to_string(), "ghost".to_string(), "c2".to_string()];
        let citations = resolve_citations(&ids, &candidates);
        assert_eq!(
            citations,
            vec![Citation {
                chunk_id: "c2".to_string(),
                source_id: Some("file-c2".to_string()),
                header: "Finance".to_string(),
            }]
        );
    }

    struct Scripted(Result<&'static str, ()>);

    #[async_trait]
    impl GenerationService for Scripted {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, GenerationError> {
            assert!(prompt.contains("Question: when?"));
            self.0
                .map(str::to_string)
                .map_err(|_| GenerationError::Request("down".to_string()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn synthesizer(reply: Result<&'static str, ()>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(
            Arc::new(Scripted(reply)),
            Arc::new(PromptTemplates::new(&PromptConfig::default()).unwrap()),
            GenerationOptions::new("reason"),
        )
    }

    #[tokio::test]
    async fn test_reason_returns_answer_and_ids() {
        let answer = synthesizer(Ok("March 1.\nCitations: [c1]"))
            .reason("when?", "[c1] Launch date is March 1")
            .await
            .unwrap();
        assert_eq!(answer.text, "March 1.");
        assert_eq!(answer.citation_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_reason_failure_is_synthesis_error() {
        let err = synthesizer(Err(())).reason("when?", "ctx").await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis(_)));
    }
}
