//! Document ingestion pipeline.
//!
//! Coordinates the flow: input resolution → text extraction → chunking →
//! embedding → vector index. Each file is embedded completely before any of
//! its chunks reach the index, so a failure never leaves half a file
//! searchable. Ingesting a file again replaces the chunks it had before.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::chunk::{extract_and_chunk, to_document_chunks};
use crate::config::IngestConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::extract::read_document;
use crate::models::DocumentChunk;
use crate::progress::{IngestEvent, IngestProgressReporter};
use crate::vector_index::VectorIndex;

/// Outcome of one [`DocumentProcessor::process`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    /// Files read and indexed.
    pub indexed: usize,
    /// Chunks added during this run.
    pub chunks: usize,
    /// Total chunks in the index afterwards.
    pub vector_store_size: usize,
}

pub struct DocumentProcessor {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    batch_size: usize,
    config: IngestConfig,
}

impl DocumentProcessor {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        batch_size: usize,
        config: IngestConfig,
    ) -> Self {
        Self {
            provider,
            index,
            batch_size: batch_size.max(1),
            config,
        }
    }

    /// Read, chunk, embed and index every file reachable from `paths`.
    pub async fn process(
        &self,
        paths: &[PathBuf],
        progress: &dyn IngestProgressReporter,
    ) -> Result<IngestSummary> {
        let files = resolve_inputs(paths, &self.config)?;
        let total = files.len() as u64;
        progress.report(IngestEvent::Started { total });
        tracing::info!("ingesting {} file(s)", total);

        let mut chunks_added = 0usize;
        for (i, path) in files.iter().enumerate() {
            let owned = path.clone();
            let chunks = tokio::task::spawn_blocking(move || chunk_file(&owned))
                .await
                .map_err(|e| EngineError::Extraction {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })??;
            let count = chunks.len();
            let file = display_name(path);
            let replaced = self.index_chunks(&file, chunks).await?;
            chunks_added += count;
            if replaced > 0 {
                tracing::debug!("replaced {} earlier chunk(s) of {}", replaced, file);
            }

            tracing::debug!("indexed {} ({} chunks)", file, count);
            progress.report(IngestEvent::Processed {
                file,
                n: i as u64 + 1,
                total,
                chunks: count as u64,
            });
        }

        progress.report(IngestEvent::Finished {
            files: total,
            chunks: chunks_added as u64,
        });

        Ok(IngestSummary {
            indexed: files.len(),
            chunks: chunks_added,
            vector_store_size: self.index.size(),
        })
    }

    async fn index_chunks(&self, document_id: &str, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.provider.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(EngineError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
        }

        self.index.replace_document(document_id, embeddings, chunks)
    }
}

/// Read and chunk a single file without embedding it.
pub fn chunk_file(path: &Path) -> Result<Vec<DocumentChunk>> {
    let text = read_document(path)?;
    let texts = extract_and_chunk(&text, &display_name(path));
    Ok(to_document_chunks(path, texts))
}

/// Chunk counts per file, for `hq ingest --dry-run`.
pub fn plan(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<(PathBuf, usize)>> {
    resolve_inputs(paths, config)?
        .into_iter()
        .map(|path| {
            let count = chunk_file(&path)?.len();
            Ok((path, count))
        })
        .collect()
}

/// Expand `paths` into a sorted, de-duplicated file list.
///
/// Files are taken as given. Directories are walked and filtered by the
/// include/exclude globs, matched against the path relative to the
/// directory.
pub fn resolve_inputs(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        if !root.is_dir() {
            return Err(EngineError::Io {
                path: root.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| EngineError::Io {
                path: root.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy();
            if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
                continue;
            }
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| EngineError::Configuration(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
