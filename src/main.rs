use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use hoprag::config::Config;
use hoprag::embedding::ollama::OllamaEmbeddingProvider;
use hoprag::embedding::openai::OpenAIEmbeddingProvider;
use hoprag::embedding::EmbeddingProvider;
use hoprag::engine::RagEngine;
use hoprag::generation::ollama::OllamaGenerationService;
use hoprag::generation::openai::OpenAIGenerationService;
use hoprag::generation::{warm_up, GenerationService};
use hoprag::lexical::LexicalIndexCache;
use hoprag::logging;
use hoprag::rerank::http::HttpRerankerService;
use hoprag::rerank::Reranker;
use hoprag::search::{HybridRetriever, RetrievalMode};
use hoprag::semantic::http::HttpVectorSearch;
use hoprag::semantic::SemanticRetriever;
use hoprag::store::postgres::PostgresChunkStore;
use hoprag::store::ChunkStore;

#[derive(Parser)]
#[command(name = "hoprag", version, about = "Hybrid retrieval and multi-hop question answering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question against a collection
    Ask {
        #[arg(long)]
        collection: String,
        /// "document" or "chat"
        #[arg(long, default_value = "document")]
        mode: RetrievalMode,
        question: String,
    },
    /// Run hybrid retrieval and print the ranked candidates
    Retrieve {
        #[arg(long)]
        collection: String,
        #[arg(long, default_value = "document")]
        mode: RetrievalMode,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        alpha: Option<f64>,
        query: String,
    },
    /// Run BM25 search only
    Lexical {
        #[arg(long)]
        collection: String,
        #[arg(long, default_value = "document")]
        mode: RetrievalMode,
        #[arg(long, default_value_t = 10)]
        k: usize,
        query: String,
    },
    /// Load every configured generation model with a one-token request
    Warmup,
}

/// Create the embedding provider based on configuration.
fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_secs(config.embedding.timeout_secs);
    match config.embedding.provider.as_str() {
        "openai" => {
            let api_key = config.embedding.openai_api_key.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "OpenAI API key required when embedding provider is 'openai'. \
                     Set HOPRAG_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in hoprag.toml"
                ))?;
            Ok(Arc::new(OpenAIEmbeddingProvider::new(
                config.embedding.openai_base_url.clone(),
                api_key,
                config.embedding.openai_model.clone(),
                timeout,
            )?))
        }
        _ => Ok(Arc::new(OllamaEmbeddingProvider::new(
            config.embedding.ollama_base_url.clone(),
            config.embedding.ollama_model.clone(),
            timeout,
        )?)),
    }
}

/// Create the generation service based on configuration.
fn create_generation_service(config: &Config) -> Result<Arc<dyn GenerationService>> {
    let timeout = Duration::from_secs(config.generation.timeout_secs);
    match config.generation.provider.as_str() {
        "openai" => {
            let api_key = config.generation.openai_api_key.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "OpenAI API key required when generation provider is 'openai'. \
                     Set HOPRAG_GENERATION__OPENAI_API_KEY or generation.openai_api_key in hoprag.toml"
                ))?;
            Ok(Arc::new(OpenAIGenerationService::new(
                config.generation.openai_base_url.clone(),
                api_key,
                timeout,
            )?))
        }
        _ => Ok(Arc::new(OllamaGenerationService::new(
            config.generation.ollama_base_url.clone(),
            timeout,
        )?)),
    }
}

/// Create the reranker if enabled.
fn create_reranker(config: &Config) -> Result<Option<Arc<Reranker>>> {
    if !config.reranker.enabled {
        tracing::info!("Reranking disabled via config (reranker.enabled=false)");
        return Ok(None);
    }
    let service = HttpRerankerService::new(
        config.reranker.base_url.clone(),
        Duration::from_secs(config.reranker.timeout_secs),
    )?;
    Ok(Some(Arc::new(Reranker::new(Arc::new(service), &config.reranker)?)))
}

async fn create_retriever(config: &Config) -> Result<Arc<HybridRetriever>> {
    let store: Arc<dyn ChunkStore> = Arc::new(PostgresChunkStore::new(&config.database_url).await?);
    tracing::info!("PostgreSQL chunk store initialized");

    let lexical = Arc::new(LexicalIndexCache::new(store.clone(), &config.lexical));
    let vectors = HttpVectorSearch::new(
        config.vector.base_url.clone(),
        Duration::from_secs(config.vector.timeout_secs),
    )?;
    let semantic = SemanticRetriever::new(create_embedding_provider(config)?, Arc::new(vectors));

    Ok(Arc::new(HybridRetriever::new(
        store,
        lexical,
        semantic,
        create_reranker(config)?,
        &config.retrieval,
    )?))
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling query");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // Logging goes to stderr; stdout carries the JSON result.
    logging::init_logging(&config);

    match cli.command {
        Commands::Ask { collection, mode, question } => {
            let retriever = create_retriever(&config).await?;
            let engine = RagEngine::new(retriever, create_generation_service(&config)?, &config)?;
            let cancel = cancel_on_ctrl_c();
            let answer = engine.answer(&collection, &question, mode, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }

        Commands::Retrieve { collection, mode, top_k, alpha, query } => {
            let retriever = create_retriever(&config).await?;
            let engine = RagEngine::new(retriever, create_generation_service(&config)?, &config)?;
            let outcome = engine.retrieve(&collection, &query, mode, top_k, alpha).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "source": outcome.source(),
                    "candidates": outcome.candidates,
                }))?
            );
        }

        Commands::Lexical { collection, mode, k, query } => {
            let store: Arc<dyn ChunkStore> = Arc::new(PostgresChunkStore::new(&config.database_url).await?);
            let cache = LexicalIndexCache::new(store, &config.lexical);
            let hits = cache.search(&mode.collection_key(&collection), &query, k).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }

        Commands::Warmup => {
            let generator = create_generation_service(&config)?;
            let generation = &config.generation;
            let failed = warm_up(
                generator.as_ref(),
                &[
                    &generation.decompose,
                    &generation.hop,
                    &generation.compress,
                    &generation.reason,
                    &generation.fuse,
                ],
            )
            .await;
            if !failed.is_empty() {
                anyhow::bail!("Failed to warm up models: {}", failed.join(", "));
            }
            println!("All generation models warmed up.");
        }
    }

    Ok(())
}
