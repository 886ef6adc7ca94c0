//! Query-time access to a loaded index.
//!
//! The retriever owns the process-wide index slot. Loading is explicit and
//! all-or-nothing: a failed load leaves whatever was loaded before untouched.


use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::index::{Index, IndexHeader};
use crate::{RagError, Result};

pub use crate::index::SearchHit;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: RwLock<Option<Arc<Index>>>,
    /// Present only for backends that cannot embed from several threads at once
    embed_lock: Option<Mutex<()>>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let embed_lock = (!embedder.supports_concurrent_calls()).then(|| Mutex::new(()));
        Self {
            embedder,
            index: RwLock::new(None),
            embed_lock,
        }
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Load a persisted index and make it the active one
    #[inline]
    pub fn load(&self, path: &Path) -> Result<()> {
        let index = Index::load(path)?;
        self.install(index)?;
        info!("Index loaded from {}", path.display());
        Ok(())
    }

    /// Replace the active index with a freshly loaded one. Searches already in
    /// flight finish against the index they started with.
    #[inline]
    pub fn reload(&self, path: &Path) -> Result<()> {
        let index = Index::load(path)?;
        let previous = self.index_header();
        self.install(index)?;
        info!(
            "Index reloaded from {} (previous content hash: {})",
            path.display(),
            previous.map_or_else(|| "none".to_string(), |h| h.content_hash)
        );
        Ok(())
    }

    /// Activate an index that is already in memory
    #[inline]
    pub fn install(&self, index: Index) -> Result<()> {
        index.check_compatible(self.embedder.model_id(), self.embedder.dimension())?;
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(index));
        Ok(())
    }

    #[inline]
    pub fn unload(&self) {
        if self
            .index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("Index unloaded");
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    #[inline]
    pub fn index_header(&self) -> Option<IndexHeader> {
        self.snapshot().map(|index| index.header().clone())
    }

    /// Return the `min(k, passage_count)` passages most similar to `query`
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let index = self.snapshot().ok_or(RagError::IndexNotLoaded)?;
        if k == 0 {
            return Err(RagError::Configuration(
                "k must be greater than zero".to_string(),
            ));
        }

        let query_vector = self.embed_query(query.trim())?;
        let hits = index.search(&query_vector, k)?;

        debug!(
            "Query '{}' matched {} passages (top score {:?})",
            query,
            hits.len(),
            hits.first().map(|h| h.score)
        );
        Ok(hits)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let _guard = self
            .embed_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.embedder.embed_one(query)
    }

    fn snapshot(&self) -> Option<Arc<Index>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
