//! The searchable passage index: built once per corpus, persisted as a single
//! artifact and scanned exhaustively at query time.

#[cfg(test)]
mod tests;

mod persistence;

pub use persistence::INDEX_FORMAT;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chunking::{ChunkingConfig, Passage, PassageId};
use crate::{RagError, Result};

/// Current on-disk layout version. Bump when header or record fields change.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format_version: u32,
    /// Identifier of the embedding model that produced the vectors
    pub model: String,
    pub dimension: usize,
    /// SHA-256 over the indexed passages
    pub content_hash: String,
    pub passage_count: usize,
    pub document_count: usize,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    pub id: PassageId,
    pub document_id: String,
    pub page: Option<u32>,
    pub start_offset: usize,
    pub text: String,
    /// Unit-length embedding
    pub vector: Vec<f32>,
}

/// One ranked passage returned by a search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: PassageId,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
    pub document_id: String,
    pub page: Option<u32>,
    pub start_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    header: IndexHeader,
    records: Vec<PassageRecord>,
}

impl Index {
    #[inline]
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    #[inline]
    pub fn records(&self) -> &[PassageRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fail with [`RagError::IndexVersionMismatch`] unless this index was built
    /// by the given model at the given dimension.
    #[inline]
    pub fn check_compatible(&self, model_id: &str, dimension: usize) -> Result<()> {
        if self.header.dimension != dimension {
            return Err(RagError::IndexVersionMismatch {
                expected: format!("dimension {dimension}"),
                found: format!("dimension {}", self.header.dimension),
            });
        }
        if self.header.model != model_id {
            return Err(RagError::IndexVersionMismatch {
                expected: format!("model {model_id}"),
                found: format!("model {}", self.header.model),
            });
        }
        Ok(())
    }

    /// Exact nearest-neighbour search by cosine similarity.
    ///
    /// Returns at most `k` hits ordered by descending score, ties broken by
    /// ascending passage id.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::Configuration(
                "k must be greater than zero".to_string(),
            ));
        }
        if query.len() != self.header.dimension {
            return Err(RagError::Embedding(format!(
                "Query vector has {} dimensions, index expects {}",
                query.len(),
                self.header.dimension
            )));
        }
        let query = normalize(query.to_vec())?;

        let mut scored: Vec<(f32, &PassageRecord)> = self
            .records
            .iter()
            .map(|record| (dot(&query, &record.vector).clamp(-1.0, 1.0), record))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        debug!(
            "Scored {} passages, returning {}",
            self.records.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchHit {
                id: record.id.clone(),
                score,
                document_id: record.document_id.clone(),
                page: record.page,
                start_offset: record.start_offset,
                text: record.text.clone(),
            })
            .collect())
    }
}

/// Pairs passages with their embeddings into an [`Index`]
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    model_id: String,
    dimension: usize,
    chunking: ChunkingConfig,
}

impl IndexBuilder {
    #[inline]
    pub fn new(model_id: impl Into<String>, dimension: usize, chunking: ChunkingConfig) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            chunking,
        }
    }

    /// `vectors[i]` must be the embedding of `passages[i]`
    #[inline]
    pub fn build(&self, passages: &[Passage], vectors: Vec<Vec<f32>>) -> Result<Index> {
        if passages.len() != vectors.len() {
            return Err(RagError::Configuration(format!(
                "Got {} passages but {} vectors",
                passages.len(),
                vectors.len()
            )));
        }

        let mut records = Vec::with_capacity(passages.len());
        for (passage, vector) in passages.iter().zip(vectors) {
            if vector.len() != self.dimension {
                return Err(RagError::Configuration(format!(
                    "Vector for passage {} has {} dimensions, expected {}",
                    passage.id,
                    vector.len(),
                    self.dimension
                )));
            }
            let vector = normalize(vector).map_err(|e| {
                RagError::Embedding(format!("Passage {}: {e}", passage.id))
            })?;

            records.push(PassageRecord {
                id: passage.id.clone(),
                document_id: passage.id.document_id.clone(),
                page: passage.page,
                start_offset: passage.start_offset,
                text: passage.text.clone(),
                vector,
            });
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut document_ids: Vec<&str> = records.iter().map(|r| r.document_id.as_str()).collect();
        document_ids.dedup();

        let header = IndexHeader {
            format_version: FORMAT_VERSION,
            model: self.model_id.clone(),
            dimension: self.dimension,
            content_hash: content_hash(&records),
            passage_count: records.len(),
            document_count: document_ids.len(),
            chunking: self.chunking.clone(),
        };

        debug!(
            "Built index of {} passages from {} documents",
            header.passage_count, header.document_count
        );

        Ok(Index { header, records })
    }
}

/// Hash of the passage content, independent of the embedding model
fn content_hash(records: &[PassageRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.id.to_string().as_bytes());
        hasher.update([0]);
        hasher.update((record.start_offset as u64).to_le_bytes());
        hasher.update(record.text.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length; zero or non-finite vectors cannot be normalised
fn normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RagError::Embedding(
            "Vector contains non-finite values".to_string(),
        ));
    }
    let norm = dot(&vector, &vector).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(RagError::Embedding("Vector has zero norm".to_string()));
    }
    vector.iter_mut().for_each(|v| *v /= norm);
    Ok(vector)
}
