/// Hybrid search: request types, score fusion, and the retrieval pipeline
///
/// `fusion` is the pure scoring step. `hybrid` wires the lexical and semantic
/// legs, hydration from the chunk store, and the optional rerank pass.

pub mod fusion;
pub mod hybrid;

pub use fusion::{fuse_scores, normalize, FusedScore};
pub use hybrid::{HybridRetriever, RetrievalOutcome};

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Which corpus a question is asked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Document,
    Chat,
}

impl RetrievalMode {
    /// Key under which the collection is stored in the lexical and vector indexes.
    pub fn collection_key(&self, collection_id: &str) -> String {
        match self {
            RetrievalMode::Document => collection_id.to_string(),
            RetrievalMode::Chat => format!("chat_{}", collection_id),
        }
    }

    /// Answer returned when retrieval finds nothing for a single-hop question.
    pub fn fallback_answer(&self) -> &'static str {
        match self {
            RetrievalMode::Document => "I don't know based on the provided content.",
            RetrievalMode::Chat => "I don't know based on the recent chat history.",
        }
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" | "doc" => Ok(RetrievalMode::Document),
            "chat" => Ok(RetrievalMode::Chat),
            other => Err(RagError::validation(
                "mode",
                &format!("unknown retrieval mode '{}', expected 'document' or 'chat'", other),
            )),
        }
    }
}

/// One retrieval call: which collection, what to look for, how many, and how to weight the legs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub collection_id: String,
    pub query_text: String,
    pub top_k: usize,
    /// 1.0 = semantic only, 0.0 = lexical only
    pub alpha: f64,
}

impl RetrievalRequest {
    pub fn new(
        collection_id: impl Into<String>,
        query_text: impl Into<String>,
        top_k: usize,
        alpha: f64,
    ) -> Result<Self, RagError> {
        if top_k == 0 {
            return Err(RagError::validation("top_k", "top_k must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RagError::validation("alpha", "alpha must be within [0, 1]"));
        }
        Ok(RetrievalRequest {
            collection_id: collection_id.into(),
            query_text: query_text.into(),
            top_k,
            alpha,
        })
    }
}

/// Per-query candidate carried through fusion, hydration, and reranking.
///
/// Scores are the raw leg scores; `fused_score` is computed from their normalized values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub chunk_id: String,
    pub source_id: Option<String>,
    pub header: String,
    pub text: String,
    pub lexical_score: Option<f64>,
    pub semantic_score: Option<f64>,
    pub fused_score: f64,
    pub rerank_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_prefixes_collection_key() {
        assert_eq!(RetrievalMode::Chat.collection_key("42"), "chat_42");
        assert_eq!(RetrievalMode::Document.collection_key("42"), "42");
    }

    #[test]
    fn test_modes_have_distinct_fallbacks() {
        assert_ne!(
            RetrievalMode::Chat.fallback_answer(),
            RetrievalMode::Document.fallback_answer()
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Chat".parse::<RetrievalMode>().unwrap(), RetrievalMode::Chat);
        assert_eq!("doc".parse::<RetrievalMode>().unwrap(), RetrievalMode::Document);
        assert!("slack".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn test_request_validation() {
        assert!(RetrievalRequest::new("c", "q", 5, 0.7).is_ok());
        assert!(RetrievalRequest::new("c", "q", 5, 0.0).is_ok());
        assert!(RetrievalRequest::new("c", "q", 5, 1.0).is_ok());

        let err = RetrievalRequest::new("c", "q", 0, 0.5).unwrap_err();
        assert!(matches!(err, RagError::Validation { field: Some(ref f), .. } if f == "top_k"));

        let err = RetrievalRequest::new("c", "q", 3, 1.5).unwrap_err();
        assert!(matches!(err, RagError::Validation { field: Some(ref f), .. } if f == "alpha"));
    }
}
