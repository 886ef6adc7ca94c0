//! Offline build pipeline: corpus → passages → embeddings → persisted index.


use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::chunking::{Chunker, Passage};
use crate::config::Config;
use crate::corpus::{Document, load_corpus};
use crate::embeddings::Embedder;
use crate::index::{Index, IndexBuilder};
use crate::{RagError, Result};

/// Builds and persists the passage index for a corpus
pub struct Indexer {
    config: Config,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    index_path: PathBuf,
    lock_file_path: PathBuf,
    show_progress: bool,
}

/// Statistics about a completed build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingStats {
    pub documents_processed: usize,
    pub empty_documents: usize,
    pub passages_created: usize,
    pub embeddings_generated: usize,
    pub content_hash: String,
    pub elapsed: Duration,
}

/// Exclusive claim on an index path, released on drop
#[derive(Debug)]
struct BuildLock {
    path: PathBuf,
}

impl Drop for BuildLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove build lock {}: {}", self.path.display(), e);
        }
    }
}

impl Indexer {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::from_config(&config.chunking)?;
        let index_path = config.index_path();
        let lock_file_path = lock_path_for(&index_path);

        Ok(Self {
            config,
            embedder,
            chunker,
            index_path,
            lock_file_path,
            show_progress: true,
        })
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Whether another build currently holds the lock for this index path
    #[inline]
    pub fn is_build_running(&self) -> bool {
        self.lock_file_path.exists()
    }

    /// Build from the configured corpus directory and persist the result
    #[inline]
    pub fn build(&self) -> Result<IndexingStats> {
        self.build_from_dir(&self.config.corpus_dir())
    }

    /// Build from `corpus_dir` and persist the result
    #[inline]
    pub fn build_from_dir(&self, corpus_dir: &Path) -> Result<IndexingStats> {
        let start = Instant::now();
        let _lock = self.acquire_lock()?;

        info!("Building index from {}", corpus_dir.display());
        let documents = load_corpus(corpus_dir)?;
        let (index, mut stats) = self.build_index(&documents)?;
        index.save(&self.index_path)?;

        stats.elapsed = start.elapsed();
        info!(
            "Indexed {} passages from {} documents in {:.1}s",
            stats.passages_created,
            stats.documents_processed,
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }

    /// Chunk, embed and assemble an index in memory. Any embedding failure
    /// fails the whole build.
    #[inline]
    pub fn build_index(&self, documents: &[Document]) -> Result<(Index, IndexingStats)> {
        let empty_documents = documents.iter().filter(|d| d.is_empty()).count();
        if empty_documents > 0 {
            warn!("{} documents contain no text and were skipped", empty_documents);
        }

        let passages = self.chunker.chunk_all(documents);
        let vectors = self.embed_passages(&passages)?;

        let builder = IndexBuilder::new(
            self.embedder.model_id(),
            self.embedder.dimension(),
            self.config.chunking.clone(),
        );
        let index = builder.build(&passages, vectors)?;

        let stats = IndexingStats {
            documents_processed: documents.len(),
            empty_documents,
            passages_created: passages.len(),
            embeddings_generated: index.len(),
            content_hash: index.header().content_hash.clone(),
            elapsed: Duration::ZERO,
        };
        Ok((index, stats))
    }

    fn embed_passages(&self, passages: &[Passage]) -> Result<Vec<Vec<f32>>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let bar = if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new(passages.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let batch_size = (self.config.embedding.batch_size as usize).max(1);
        let mut vectors = Vec::with_capacity(passages.len());

        for batch in passages.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            if let Some(first) = batch.first() {
                bar.set_message(first.id.to_string());
            }

            let batch_vectors = match self.embedder.embed(&texts) {
                Ok(batch_vectors) => batch_vectors,
                Err(e) => {
                    bar.abandon_with_message("failed");
                    return Err(e);
                }
            };
            vectors.extend(batch_vectors);
            bar.inc(batch.len() as u64);
        }

        bar.finish_with_message("done");
        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    fn acquire_lock(&self) -> Result<BuildLock> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_file_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RagError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "Another build is already writing {} (remove {} if it is stale)",
                        self.index_path.display(),
                        self.lock_file_path.display()
                    ),
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let lock = BuildLock {
            path: self.lock_file_path.clone(),
        };
        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired build lock {}", self.lock_file_path.display());
        Ok(lock)
    }
}

fn lock_path_for(index_path: &Path) -> PathBuf {
    let mut name = index_path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    index_path.with_file_name(name)
}
