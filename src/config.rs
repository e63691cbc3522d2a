/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: hoprag.toml (in working directory)
/// 3. Environment variables: prefixed HOPRAG_, nested keys split on `__`
///    (e.g., HOPRAG_RERANKER__BASE_URL=http://rerank:8001)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::RagError;
use crate::generation::GenerationOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for JSON log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    /// PostgreSQL connection string for the chunk store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector: VectorSearchConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub multihop: MultiHopConfig,

    #[serde(default)]
    pub prompts: PromptConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/chat_db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            database_url: default_database_url(),
            retrieval: RetrievalConfig::default(),
            lexical: LexicalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector: VectorSearchConfig::default(),
            reranker: RerankerConfig::default(),
            generation: GenerationConfig::default(),
            compression: CompressionConfig::default(),
            multihop: MultiHopConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: HOPRAG_MULTIHOP__MAX_SUB_QUESTIONS=4 overrides multihop.max_sub_questions
    pub fn load() -> Result<Config, RagError> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("hoprag.toml"))
            .merge(Env::prefixed("HOPRAG_").split("__"))
            .extract()
            .map_err(|e| RagError::Config(format!("Failed to load config: {}", e)))
    }
}

/// A `{pattern, bonus}` pair used by the reranker's deterministic adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusRule {
    /// Regular expression (use `(?i)` for case-insensitive matching)
    pub pattern: String,
    /// Additive bonus applied on top of the cross-encoder score
    pub bonus: f64,
}

/// Document-mode query expansion: when `pattern` matches the question,
/// `terms` are appended to the retrieval query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionRule {
    pub pattern: String,
    pub terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of candidates kept after fusion and reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Fusion weight: 1.0 = semantic only, 0.0 = lexical only
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Each retrieval leg fetches max(top_k * candidate_multiplier, min_candidates)
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    #[serde(default)]
    pub expansion_rules: Vec<ExpansionRule>,
}

fn default_top_k() -> usize { 5 }
fn default_alpha() -> f64 { 0.7 }
fn default_candidate_multiplier() -> usize { 4 }
fn default_min_candidates() -> usize { 10 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_k: default_top_k(),
            alpha: default_alpha(),
            candidate_multiplier: default_candidate_multiplier(),
            min_candidates: default_min_candidates(),
            expansion_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// BM25 term-frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// BM25 length normalization
    #[serde(default = "default_b")]
    pub b: f64,

    /// Maximum number of collection indexes held in memory
    #[serde(default = "default_max_cached_collections")]
    pub max_cached_collections: u64,

    /// Cached indexes are rebuilt after this many seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_k1() -> f64 { 1.5 }
fn default_b() -> f64 { 0.75 }
fn default_max_cached_collections() -> u64 { 256 }
fn default_cache_ttl_secs() -> u64 { 3600 }

impl Default for LexicalConfig {
    fn default() -> Self {
        LexicalConfig {
            k1: default_k1(),
            b: default_b(),
            max_cached_collections: default_max_cached_collections(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" (default) or "openai"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_embedding_ollama_model")]
    pub ollama_model: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_embedding_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_ollama_base_url() -> String { "http://127.0.0.1:11434".to_string() }
fn default_embedding_ollama_model() -> String { "nomic-embed-text:latest".to_string() }
fn default_openai_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_openai_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_timeout_secs() -> u64 { 30 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_embedding_ollama_model(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            openai_model: default_embedding_openai_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    #[serde(default = "default_vector_base_url")]
    pub base_url: String,

    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_vector_base_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_vector_timeout_secs() -> u64 { 10 }

impl Default for VectorSearchConfig {
    fn default() -> Self {
        VectorSearchConfig {
            base_url: default_vector_base_url(),
            timeout_secs: default_vector_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// When false, candidates keep their fused order
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reranker_base_url")]
    pub base_url: String,

    #[serde(default = "default_reranker_timeout_secs")]
    pub timeout_secs: u64,

    /// Matched against the query; the matched text must appear in the candidate header.
    #[serde(default = "default_header_rules")]
    pub header_rules: Vec<BonusRule>,

    /// Matched against the candidate text.
    #[serde(default)]
    pub domain_rules: Vec<BonusRule>,
}

fn default_true() -> bool { true }
fn default_reranker_base_url() -> String { "http://127.0.0.1:8001".to_string() }
fn default_reranker_timeout_secs() -> u64 { 15 }

fn default_header_rules() -> Vec<BonusRule> {
    vec![BonusRule {
        pattern: r"(?i)section\s*\d+".to_string(),
        bonus: 0.4,
    }]
}

impl Default for RerankerConfig {
    fn default() -> Self {
        RerankerConfig {
            enabled: true,
            base_url: default_reranker_base_url(),
            timeout_secs: default_reranker_timeout_secs(),
            header_rules: default_header_rules(),
            domain_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// "ollama" (default) or "openai"
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_decompose_options")]
    pub decompose: GenerationOptions,

    #[serde(default = "default_answer_options")]
    pub hop: GenerationOptions,

    #[serde(default = "default_compress_options")]
    pub compress: GenerationOptions,

    #[serde(default = "default_reason_options")]
    pub reason: GenerationOptions,

    #[serde(default = "default_answer_options")]
    pub fuse: GenerationOptions,
}

fn default_generation_provider() -> String { "ollama".to_string() }
fn default_generation_timeout_secs() -> u64 { 120 }

fn default_decompose_options() -> GenerationOptions {
    GenerationOptions::new("llama3.2:3b")
}

fn default_answer_options() -> GenerationOptions {
    GenerationOptions::new("llama3.1:8b-instruct-q4_K_M")
}

fn default_compress_options() -> GenerationOptions {
    GenerationOptions::new("llama3.1:8b-instruct-q3_K_M").with_max_tokens(800)
}

fn default_reason_options() -> GenerationOptions {
    GenerationOptions::new("llama3.1:8b-instruct-q4_K_M").with_max_tokens(800)
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            provider: default_generation_provider(),
            ollama_base_url: default_ollama_base_url(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            timeout_secs: default_generation_timeout_secs(),
            decompose: default_decompose_options(),
            hop: default_answer_options(),
            compress: default_compress_options(),
            reason: default_reason_options(),
            fuse: default_answer_options(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Estimated-token ceiling for the joined context before summarization kicks in
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

fn default_token_budget() -> usize { 6000 }

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            token_budget: default_token_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiHopConfig {
    /// When false, compound questions go through the single-hop pipeline
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Decomposition output beyond this count is truncated
    #[serde(default = "default_max_sub_questions")]
    pub max_sub_questions: usize,

    /// Per-candidate character cap when building a hop's context window
    #[serde(default = "default_context_char_cap")]
    pub context_char_cap: usize,

    /// Number of hops executed concurrently
    #[serde(default = "default_hop_concurrency")]
    pub hop_concurrency: usize,
}

fn default_max_sub_questions() -> usize { 3 }
fn default_context_char_cap() -> usize { 800 }
fn default_hop_concurrency() -> usize { 3 }

impl Default for MultiHopConfig {
    fn default() -> Self {
        MultiHopConfig {
            enabled: true,
            max_sub_questions: default_max_sub_questions(),
            context_char_cap: default_context_char_cap(),
            hop_concurrency: default_hop_concurrency(),
        }
    }
}

/// Optional minijinja template overrides. `None` keeps the built-in template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub decompose: Option<String>,
    #[serde(default)]
    pub hop: Option<String>,
    #[serde(default)]
    pub compress: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub fuse: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, None);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.alpha - 0.7).abs() < f64::EPSILON);
        assert!((config.lexical.k1 - 1.5).abs() < f64::EPSILON);
        assert!((config.lexical.b - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.compression.token_budget, 6000);
        assert_eq!(config.multihop.max_sub_questions, 3);
        assert_eq!(config.multihop.context_char_cap, 800);
    }

    #[test]
    fn test_default_header_rule_is_section_pattern() {
        let config = RerankerConfig::default();
        assert_eq!(config.header_rules.len(), 1);
        assert!((config.header_rules[0].bonus - 0.4).abs() < f64::EPSILON);
        assert!(config.domain_rules.is_empty());
    }

    #[test]
    fn test_call_sites_use_distinct_models() {
        let config = GenerationConfig::default();
        assert_ne!(config.decompose.model, config.fuse.model);
        assert_eq!(config.compress.max_tokens, Some(800));
        assert_eq!(config.hop.max_tokens, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [multihop]
                max_sub_questions = 5

                [[reranker.domain_rules]]
                pattern = "(?i)manufacturing|factory"
                bonus = 0.6
                "#,
            ))
            .extract()
            .expect("config should parse");
        assert_eq!(config.multihop.max_sub_questions, 5);
        assert_eq!(config.multihop.context_char_cap, 800);
        assert_eq!(config.reranker.domain_rules.len(), 1);
        assert_eq!(config.reranker.header_rules.len(), 1);
    }
}
