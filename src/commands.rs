use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{Config, EmbeddingProvider};
use crate::corpus::load_corpus;
use crate::embeddings::ollama::OllamaClient;
use crate::embeddings::{Embedder, create_embedder};
use crate::index::Index;
use crate::indexer::Indexer;
use crate::mcp::{create_server, query_dnd_books};
use crate::retriever::Retriever;

/// Chunk, embed and persist the corpus
#[inline]
pub fn build_index(config_dir: &Path, corpus_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let corpus_dir = corpus_dir.unwrap_or_else(|| config.corpus_dir());

    check_ollama(&config).context("Embedding backend is not ready")?;
    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
    let indexer = Indexer::new(config, embedder).context("Failed to create indexer")?;

    let stats = indexer
        .build_from_dir(&corpus_dir)
        .with_context(|| format!("Failed to build index from {}", corpus_dir.display()))?;

    println!("{}", style("✅ Index built").bold().green());
    println!("   Documents: {}", stats.documents_processed);
    if stats.empty_documents > 0 {
        println!("   Empty documents skipped: {}", stats.empty_documents);
    }
    println!("   Passages: {}", stats.passages_created);
    println!("   Content hash: {}", stats.content_hash);
    println!("   Written to: {}", indexer.index_path().display());
    println!("   Took: {:.1}s", stats.elapsed.as_secs_f64());
    Ok(())
}

/// Run one query against the persisted index and print the rendered passages
#[inline]
pub fn search(config_dir: &Path, query: &str, k: Option<usize>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let retriever = open_retriever(&config)?;
    retriever
        .load(&config.index_path())
        .with_context(|| format!("Failed to load index {}", config.index_path().display()))?;

    let k = k.unwrap_or(config.retrieval.top_k);
    let text = query_dnd_books(&retriever, query, k)?;
    println!("{text}");
    Ok(())
}

/// Serve the query tool over MCP stdio. Stdout belongs to the protocol, so
/// everything else goes through tracing on stderr.
#[inline]
pub async fn serve_mcp(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    if let Err(e) = check_ollama(&config) {
        warn!("Embedding backend is not ready, queries may fail: {:#}", e);
    }

    let retriever = Arc::new(open_retriever(&config)?);
    let index_path = config.index_path();
    match retriever.load(&index_path) {
        Ok(()) => {
            if let Some(header) = retriever.index_header() {
                info!(
                    "Serving {} passages from {} documents",
                    header.passage_count, header.document_count
                );
            }
        }
        Err(e) => {
            error!(
                "Index {} is unavailable, queries will fail until it is rebuilt: {}",
                index_path.display(),
                e
            );
        }
    }

    let server = create_server(retriever, config.retrieval.top_k).await;
    server
        .serve_stdio()
        .await
        .context("MCP server terminated with an error")?;
    Ok(())
}

/// Report configuration, corpus and index state
#[inline]
pub fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).unwrap_or_else(|e| {
        warn!("Using default configuration: {:#}", e);
        Config::with_base_dir(config_dir)
    });

    println!("{}", style("📊 D&D Books MCP Status").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}", style("Corpus").bold().yellow());
    let corpus_dir = config.corpus_dir();
    println!("   Directory: {}", corpus_dir.display());
    match load_corpus(&corpus_dir) {
        Ok(documents) => {
            let empty = documents.iter().filter(|d| d.is_empty()).count();
            println!("   Documents: {} ({} empty)", documents.len(), empty);
        }
        Err(e) => println!("   ❌ {}", e),
    }
    println!();

    println!("{}", style("Embedding").bold().yellow());
    println!("   Provider: {}", config.embedding.provider);
    println!("   Dimension: {}", config.embedding.dimension);
    if config.embedding.provider == EmbeddingProvider::Ollama {
        println!("   Model: {}", config.embedding.model);
        match check_ollama(&config) {
            Ok(()) => println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.embedding.host, config.embedding.port
            ),
            Err(e) => println!("   ❌ Ollama: {:#}", e),
        }
    }
    println!();

    println!("{}", style("Index").bold().yellow());
    let index_path = config.index_path();
    println!("   Path: {}", index_path.display());

    let embedder = create_embedder(&config.embedding).ok();
    if let Some(embedder) = &embedder {
        match Indexer::new(config.clone(), Arc::clone(embedder)) {
            Ok(indexer) if indexer.is_build_running() => println!("   🔄 A build is in progress"),
            Ok(_) => {}
            Err(e) => println!("   ⚠️  {}", e),
        }
    }

    if !index_path.exists() {
        println!("   💤 Not built yet. Run 'dnd-books-mcp build'.");
        return Ok(());
    }

    match Index::load(&index_path) {
        Ok(index) => {
            let header = index.header();
            println!("   Format version: {}", header.format_version);
            println!("   Model: {} ({} dimensions)", header.model, header.dimension);
            println!(
                "   Passages: {} from {} documents",
                header.passage_count, header.document_count
            );
            println!(
                "   Chunking: {} characters, {} overlap",
                header.chunking.max_chunk_size, header.chunking.overlap
            );
            println!("   Content hash: {}", header.content_hash);

            if let Some(embedder) = &embedder {
                match index.check_compatible(embedder.model_id(), embedder.dimension()) {
                    Ok(()) => println!("   ✅ Compatible with the configured embedder"),
                    Err(e) => println!("   ❌ {}. Rebuild the index.", e),
                }
            }
        }
        Err(e) => println!("   ❌ {}", e),
    }

    Ok(())
}

fn open_retriever(config: &Config) -> Result<Retriever> {
    let embedder: Arc<dyn Embedder> =
        create_embedder(&config.embedding).context("Failed to create embedder")?;
    Ok(Retriever::new(embedder))
}

fn check_ollama(config: &Config) -> Result<()> {
    if config.embedding.provider != EmbeddingProvider::Ollama {
        return Ok(());
    }
    OllamaClient::new(&config.embedding)?.health_check()
}
