use anyhow::Context;
use clap::Parser;
use medic_retrieval::chat::{build_context, build_generator};
use medic_retrieval::corpus::load_chunks;
use medic_retrieval::embeddings::{EmbeddingProvider, RemoteEmbedding};
use medic_retrieval::llm::{ChatCompletionsClient, CompletionClient};
use medic_retrieval::query::QueryAnalyzer;
use medic_retrieval::search::{HybridSearch, LexicalIndex, MetadataFilter};
use medic_retrieval::vectordb::USearchStore;
use medic_retrieval::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const ANSWER_PASSAGES: usize = 2;
const PASSAGE_CHARS: usize = 400;

/// Hybrid (BM25 + vector) retrieval over a medical corpus
#[derive(Parser, Debug)]
#[command(name = "medic-retrieval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze a medical question and retrieve supporting passages", long_about = None)]
struct Args {
    /// Question to search for; words are joined with spaces
    #[arg(value_name = "QUERY", required = true, num_args = 1..)]
    query: Vec<String>,

    /// Number of results to return (defaults to DEFAULT_TOP_K)
    #[arg(long = "top-k")]
    top_k: Option<usize>,

    /// Metadata filter as a JSON object, e.g. '{"topic": "diabetes"}'
    #[arg(long = "filter", value_parser = parse_json)]
    filter: Option<serde_json::Value>,

    /// Also generate an answer from the top passages
    #[arg(long = "answer")]
    answer: bool,
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("filter must be JSON: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let query = args.query.join(" ");
    let filter = args
        .filter
        .as_ref()
        .map(MetadataFilter::from_json)
        .transpose()
        .context("Invalid --filter")?;

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let chunks = match &config.corpus_path {
        Some(path) => load_chunks(path)
            .with_context(|| format!("Failed to load corpus {}", path.display()))?,
        None => {
            tracing::warn!("CORPUS_PATH not set, lexical index will be empty");
            Vec::new()
        }
    };

    let lexical = Arc::new(LexicalIndex::new(config.bm25));
    lexical.build(chunks.clone());

    let completion: Option<Arc<dyn CompletionClient>> =
        match ChatCompletionsClient::from_config(&config.completion)? {
            Some(client) => {
                tracing::info!("Completion endpoint configured: {}", config.completion.base_url);
                Some(Arc::new(client))
            }
            None => None,
        };

    let mut analyzer = QueryAnalyzer::new()?;
    if let Some(client) = &completion {
        analyzer = analyzer.with_completion(Arc::clone(client), config.decomposition.clone());
    }

    let mut search =
        HybridSearch::new(lexical, config.search.clone()).with_analyzer(Arc::new(analyzer));

    if let Some(mut embedding) = RemoteEmbedding::from_config(&config.embedding)? {
        match embedding.initialize().await {
            Ok(dimension) => {
                tracing::info!(
                    "{} embeddings initialized (dimension: {})",
                    embedding.provider_name(),
                    dimension
                );
                let store = USearchStore::new(Arc::new(embedding))?;
                store.insert_chunks(&chunks).await.context("Failed to embed corpus")?;
                search = search.with_vector(Arc::new(store));
            }
            Err(e) => {
                tracing::warn!("Embedding provider unavailable, continuing lexical-only: {}", e);
            }
        }
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let top_k = args.top_k.unwrap_or(config.search.default_top_k);
    let response = search
        .search_detailed(&query, top_k, filter.as_ref(), &cancel)
        .await
        .context("Search failed")?;

    let mut output = serde_json::json!({
        "analysis": response.analysis,
        "stats": search.stats(),
        "results": response.results,
    });

    if args.answer {
        let generator = build_generator(&config.chat, completion);
        let passages = &response.results[..response.results.len().min(ANSWER_PASSAGES)];
        let context = build_context(passages, PASSAGE_CHARS);
        let answer = generator.generate(&query, &context, &[]).await?;
        output["answer"] = serde_json::Value::String(answer);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
