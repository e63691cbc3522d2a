/// Lexical retrieval: tokenizer, per-collection BM25 index, and scoring
///
/// The index is immutable once built and shared read-only across queries
/// through `LexicalIndexCache`.
///
/// score(d) = Σ_t idf(t) * f(t,d)*(k1+1) / (f(t,d) + k1*(1 - b + b*|d|/avgdl))
/// idf(t)   = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))

pub mod cache;

pub use cache::LexicalIndexCache;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::LexicalConfig;
use crate::errors::RagError;
use crate::store::Chunk;

/// Words dropped by the tokenizer.
pub const STOP_WORDS: &[&str] = &[
    "the", "is", "are", "a", "an", "of", "and", "or", "to", "in", "on", "for", "by", "with",
    "be", "as", "at", "that", "this", "it", "from", "was", "were", "will", "shall", "would",
];

/// Lowercase, replace every non-alphanumeric character with whitespace, split,
/// and drop stop words.
///
/// `char::is_alphanumeric` keeps Latin letters with diacritics and Hangul syllables
/// intact, so "Café" and "예산" survive as single tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_owned)
        .collect()
}

/// BM25 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.5, b: 0.75 }
    }
}

impl From<&LexicalConfig> for Bm25Params {
    fn from(config: &LexicalConfig) -> Self {
        Bm25Params {
            k1: config.k1,
            b: config.b,
        }
    }
}

/// Per-chunk term statistics.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub chunk_id: String,
    pub source_id: String,
    pub header: String,
    pub term_freqs: HashMap<String, u32>,
    /// Token count after stop-word removal
    pub len: usize,
}

/// A lexical match for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub chunk_id: String,
    pub source_id: String,
    pub header: String,
    pub score: f64,
}

/// BM25 index over one collection.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    collection_id: String,
    docs: Vec<IndexedDocument>,
    doc_freqs: HashMap<String, usize>,
    total_tokens: usize,
    avgdl: f64,
    params: Bm25Params,
}

impl LexicalIndex {
    /// Build the index from a collection's chunks, tokenizing `header + text`.
    ///
    /// Chunk order is preserved and used to break score ties. A collection with no
    /// chunks produces an empty index. Duplicate chunk ids are rejected as malformed data.
    pub fn build(collection_id: &str, chunks: &[Chunk], params: Bm25Params) -> Result<Self, RagError> {
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(chunks.len());
        let mut docs = Vec::with_capacity(chunks.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0usize;

        for chunk in chunks {
            if !seen_ids.insert(chunk.id.as_str()) {
                return Err(RagError::index_build(
                    collection_id,
                    format!("duplicate chunk id {}", chunk.id),
                ));
            }

            let tokens = tokenize(&format!("{} {}", chunk.header, chunk.text));
            total_tokens += tokens.len();

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_default() += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }

            docs.push(IndexedDocument {
                chunk_id: chunk.id.clone(),
                source_id: chunk.source_id.clone(),
                header: chunk.header.clone(),
                term_freqs,
                len: tokens.len(),
            });
        }

        let avgdl = if docs.is_empty() {
            0.0
        } else {
            total_tokens as f64 / docs.len() as f64
        };

        Ok(LexicalIndex {
            collection_id: collection_id.to_string(),
            docs,
            doc_freqs,
            total_tokens,
            avgdl,
            params,
        })
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Number of indexed chunks (N).
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.docs
    }

    /// Inverse document frequency. Terms absent from the collection have no weight.
    pub fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq(term);
        if df == 0 {
            return 0.0;
        }
        let n = self.docs.len() as f64;
        let df = df as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of one document for already-tokenized query terms.
    pub fn score(&self, query_tokens: &[String], doc: &IndexedDocument) -> f64 {
        let Bm25Params { k1, b } = self.params;
        // Guard against avgdl == 0 (every chunk tokenized to nothing).
        let length_ratio = if self.avgdl > 0.0 {
            doc.len as f64 / self.avgdl
        } else {
            1.0
        };

        query_tokens
            .iter()
            .map(|term| {
                let idf = self.idf(term);
                if idf == 0.0 {
                    return 0.0;
                }
                let f = doc.term_freqs.get(term).copied().unwrap_or(0) as f64;
                idf * (f * (k1 + 1.0)) / (f + k1 * (1.0 - b + b * length_ratio))
            })
            .sum()
    }

    /// Top `k` chunks by descending BM25 score.
    ///
    /// Every chunk is ranked, including those that share no term with the query
    /// (score 0), so the list minimum stays at the true floor for normalization.
    /// Ties keep the original chunk order (stable sort).
    pub fn search(&self, query: &str, k: usize) -> Vec<LexicalHit> {
        if self.docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        let mut hits: Vec<LexicalHit> = self
            .docs
            .iter()
            .map(|doc| LexicalHit {
                chunk_id: doc.chunk_id.clone(),
                source_id: doc.source_id.clone(),
                header: doc.header.clone(),
                score: self.score(&query_tokens, doc),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }
}
