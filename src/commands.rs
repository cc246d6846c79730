//! Implementations of the `hq` subcommands.
//!
//! Results go to stdout (JSON for `schema` and `query`, a short report for
//! `ingest`); progress and logs go to stderr.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::engine::Engine;
use crate::ingest::{plan, DocumentProcessor};
use crate::progress::ProgressMode;
use crate::sanitize::clean_input;
use crate::vector_index::VectorIndex;

fn database_url(config: &Config) -> Result<&str> {
    match config.db.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => bail!("No database configured. Pass --database or set [db] url in the config."),
    }
}

/// `hq schema`: print the introspected snapshot as JSON.
pub async fn run_schema(config: &Config) -> Result<()> {
    let url = database_url(config)?;
    let engine = Engine::connect(url, config)
        .await
        .with_context(|| format!("Failed to open {}", url))?;
    println!("{}", serde_json::to_string_pretty(engine.schema().as_ref())?);
    Ok(())
}

/// `hq query`: optionally index `docs`, then answer `query` and print the
/// response as JSON.
pub async fn run_query(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    docs: &[PathBuf],
    progress: ProgressMode,
) -> Result<()> {
    let query = clean_input(query);
    if query.is_empty() {
        bail!("Query must not be empty.");
    }
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    if top_k == 0 {
        bail!("--top-k must be >= 1");
    }

    let url = database_url(config)?;
    let engine = Engine::connect(url, config)
        .await
        .with_context(|| format!("Failed to open {}", url))?;

    if !docs.is_empty() {
        let reporter = progress.reporter();
        engine.ingest_documents(docs, reporter.as_ref()).await?;
    }

    let response = engine.process_query(&query, top_k).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// `hq ingest`: check that files extract, chunk and embed with the
/// configured provider, and report counts. The index is built in memory and
/// dropped on exit; `hq query --docs` and `POST /ingest` keep theirs. With
/// `dry_run`, only chunk counts per file are printed and nothing is embedded.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    if dry_run {
        let planned = plan(paths, &config.ingest)?;
        println!("ingest (dry-run)");
        let mut total = 0usize;
        for (path, chunks) in &planned {
            println!("  {}: {} chunks", path.display(), chunks);
            total += chunks;
        }
        println!("  files: {}", planned.len());
        println!("  estimated chunks: {}", total);
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }

    let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
    let index = Arc::new(VectorIndex::new(provider.dims()));
    let processor = DocumentProcessor::new(
        provider,
        index,
        config.embedding.batch_size,
        config.ingest.clone(),
    );
    let reporter = progress.reporter();
    let summary = processor.process(paths, reporter.as_ref()).await?;

    println!("ingest");
    println!("  files indexed: {}", summary.indexed);
    println!("  chunks embedded: {}", summary.chunks);
    println!("  index size: {}", summary.vector_store_size);
    println!("  not persisted: use `hq query --docs` or `hq serve` to search documents");
    println!("ok");
    Ok(())
}
