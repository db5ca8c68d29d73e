use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::embeddings::OpenAiClient;
use crate::retrieval::{Retriever, SearchResult};
use crate::server::{self, AppState};

/// Options for a one-off search from the command line
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub k: Option<usize>,
    pub hyde: bool,
    pub json: bool,
}

/// Run a single query and print the ranked blocks
#[inline]
pub async fn search(config: Config, query: String, options: SearchOptions) -> Result<()> {
    let k = config.retrieval.effective_k(options.k);
    let hyde = options.hyde || config.retrieval.hyde;
    info!("Searching for {:?} (k = {}, hyde = {})", query, k, hyde);

    let retriever = Retriever::from_config(&config).context("Failed to build retriever")?;
    let results = tokio::task::spawn_blocking(move || retriever.top_k(&query, k, hyde))
        .await
        .map_err(|e| anyhow!("search task failed: {e}"))?
        .context("Search failed")?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results. Is the corpus empty?");
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }

    Ok(())
}

fn print_result(result: &SearchResult) {
    let title = if result.source.title.is_empty() {
        "(untitled)"
    } else {
        result.source.title.as_str()
    };

    println!("{}. {} [{:.4}]", result.rank + 1, title, result.score);
    if !result.source.authors.is_empty() {
        println!(
            "   {} - {}",
            result.source.authors.join(", "),
            result.source.date_published
        );
    }
    println!("   {}", result.url());
    println!();
    for line in result.text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        println!("   {}", line);
    }
    println!();
}

/// Serve the HTTP API until interrupted
#[inline]
pub async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;

    let retriever = Arc::new(Retriever::from_config(&config).context("Failed to build retriever")?);

    // Pay the snapshot load before the first request does.
    let warm = Arc::clone(&retriever);
    match tokio::task::spawn_blocking(move || warm.corpus().get().map(|c| c.len())).await {
        Ok(Ok(entries)) => info!("Corpus ready with {} entries", entries),
        Ok(Err(e)) => warn!("Corpus not loaded yet, will retry on first request: {}", e),
        Err(e) => warn!("Corpus warm-up task failed: {}", e),
    }

    server::serve(AppState::new(retriever, config.retrieval), addr).await
}

/// Show corpus statistics and check the model service
#[inline]
pub async fn show_info(config: Config) -> Result<()> {
    let corpus_path = config.corpus_path();
    println!("Corpus: {}", corpus_path.display());

    let corpus = tokio::task::spawn_blocking(move || Corpus::load(corpus_path))
        .await
        .map_err(|e| anyhow!("corpus task failed: {e}"))?;

    match corpus {
        Ok(corpus) => {
            let stats = corpus.stats();
            println!("  Entries: {}", stats.entries);
            println!("  Source documents: {}", stats.documents);
            println!("  Distinct links: {}", stats.distinct_urls);
            println!("  Embedding dimension: {}", stats.dimension);

            if stats.dimension != 0 && stats.dimension != config.openai.embedding_dimension as usize
            {
                println!(
                    "  ⚠ Configured model dimension is {}",
                    config.openai.embedding_dimension
                );
            }

            match corpus.verify() {
                Ok(()) => println!("  Integrity: ok"),
                Err(e) => println!("  Integrity: {}", e),
            }
        }
        Err(e) => println!("  Unavailable: {}", e),
    }

    println!();
    println!("Model service: {}", config.openai.base_url);
    if config.api_key.is_none() {
        println!("  API key not set; skipping health check");
        return Ok(());
    }

    let client = OpenAiClient::new(&config).context("Failed to build model client")?;
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .map_err(|e| anyhow!("health check task failed: {e}"))?;
    match health {
        Ok(()) => println!("  Reachable"),
        Err(e) => println!("  Unreachable: {}", e),
    }

    Ok(())
}
