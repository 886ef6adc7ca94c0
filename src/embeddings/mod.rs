//! Embedding backends: turning passages and queries into fixed-width vectors.
//!
//! Every backend implements [`Embedder`] and routes its inputs and outputs
//! through [`validate_inputs`] and [`validate_outputs`], so callers see the
//! same failure modes regardless of where vectors come from.


pub mod hash;
pub mod ollama;

pub use hash::HashEmbedder;
pub use ollama::{ModelInfo, OllamaClient};

use std::sync::Arc;

use crate::chunking::estimate_token_count;
use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::{RagError, Result};

/// Maps text to vectors of a fixed dimension.
///
/// Implementations are blocking; async callers should run them on a blocking
/// thread.
pub trait Embedder: Send + Sync {
    /// Identifier recorded in the index header; two embedders with the same id
    /// and dimension must produce interchangeable vectors.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch, returning exactly one vector per input, in order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Embedding("Backend returned no vector".to_string()))
    }

    /// Whether `embed` may be called from several threads at once
    #[inline]
    fn supports_concurrent_calls(&self) -> bool {
        true
    }
}

/// Reject batches a backend must never see: empty batches, blank inputs, and
/// inputs longer than `max_input_tokens`. Inputs are never truncated.
#[inline]
pub fn validate_inputs(texts: &[String], max_input_tokens: usize) -> Result<()> {
    if texts.is_empty() {
        return Err(RagError::Embedding("Cannot embed an empty batch".to_string()));
    }

    for (i, text) in texts.iter().enumerate() {
        if text.trim().is_empty() {
            return Err(RagError::Embedding(format!("Input {i} is empty")));
        }
        let tokens = estimate_token_count(text);
        if tokens > max_input_tokens {
            return Err(RagError::Embedding(format!(
                "Input {i} is too long: ~{tokens} tokens exceeds the limit of {max_input_tokens}"
            )));
        }
    }

    Ok(())
}

/// Check a backend's response before handing it to callers
#[inline]
pub fn validate_outputs(vectors: &[Vec<f32>], expected_count: usize, dimension: usize) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(RagError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected_count,
            vectors.len()
        )));
    }

    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(RagError::Embedding(format!(
                "Vector {i} has {} dimensions, expected {dimension}",
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Embedding(format!(
                "Vector {i} contains non-finite values"
            )));
        }
    }

    Ok(())
}

/// Build the embedder selected by `config.provider`
#[inline]
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    config.validate()?;

    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaClient::new(config)?),
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(
            config.dimension as usize,
            config.max_input_tokens,
        )?),
    };

    Ok(embedder)
}
