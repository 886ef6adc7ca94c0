#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::corpus::Document;
use crate::{RagError, Result};

/// Configuration for passage chunking, in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum passage length
    pub max_chunk_size: usize,
    /// Characters shared by consecutive passages of the same document
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 2048,
            overlap: 200,
        }
    }
}

/// Stable passage identity: source document plus position in its passage sequence.
///
/// Orders by document id, then sequence number, so `PHB-2` sorts before `PHB-10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PassageId {
    pub document_id: String,
    pub sequence: u32,
}

impl PassageId {
    #[inline]
    pub fn new(document_id: impl Into<String>, sequence: u32) -> Self {
        Self {
            document_id: document_id.into(),
            sequence,
        }
    }
}

impl fmt::Display for PassageId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.document_id, self.sequence)
    }
}

impl FromStr for PassageId {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let (document_id, sequence) = s
            .rsplit_once('-')
            .filter(|(doc, _)| !doc.is_empty())
            .ok_or_else(|| RagError::IndexCorrupt(format!("Malformed passage id: {s}")))?;
        let sequence = sequence
            .parse()
            .map_err(|_| RagError::IndexCorrupt(format!("Malformed passage id: {s}")))?;
        Ok(Self::new(document_id, sequence))
    }
}

impl TryFrom<String> for PassageId {
    type Error = RagError;

    #[inline]
    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PassageId> for String {
    #[inline]
    fn from(id: PassageId) -> Self {
        id.to_string()
    }
}

/// A contiguous span of a document's text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub id: PassageId,
    /// Character offset of the passage start within the document
    pub start_offset: usize,
    pub text: String,
    /// Length of `text` in characters
    pub char_len: usize,
    pub token_count: usize,
    /// 1-based page of `start_offset`, when the document carries page breaks
    pub page: Option<u32>,
}

/// Splits documents into overlapping, size-bounded passages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Requires `0 <= overlap < max_chunk_size`
    #[inline]
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(RagError::Configuration(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({overlap}) must be smaller than max_chunk_size ({max_chunk_size})"
            )));
        }
        Ok(Self {
            max_chunk_size,
            overlap,
        })
    }

    #[inline]
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.max_chunk_size, config.overlap)
    }

    #[inline]
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily chunk a single document. The returned iterator can be cloned to
    /// restart from the current position.
    #[inline]
    pub fn chunk<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks {
            document,
            chars: document.text.chars().collect(),
            max_chunk_size: self.max_chunk_size,
            overlap: self.overlap,
            position: 0,
            sequence: 0,
        }
    }

    /// Chunk every document, in order
    #[inline]
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Passage> {
        let passages: Vec<Passage> = documents.iter().flat_map(|d| self.chunk(d)).collect();

        debug!(
            "Chunked {} documents into {} passages (avg {} tokens)",
            documents.len(),
            passages.len(),
            passages.iter().map(|p| p.token_count).sum::<usize>() / passages.len().max(1)
        );

        passages
    }
}

/// Iterator over the passages of one document
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    chars: Vec<char>,
    max_chunk_size: usize,
    overlap: usize,
    position: usize,
    sequence: u32,
}

impl Chunks<'_> {
    /// Pick the end of a passage starting at `start` whose hard limit is
    /// `hard_end`. Searches the last quarter of the span (but never closer to
    /// the start than the overlap) for the best natural break.
    fn find_break(&self, start: usize, hard_end: usize) -> usize {
        let chars = &self.chars;
        let tolerance = (self.max_chunk_size / 4).max(1);
        let lo = (start + self.overlap + 1).max(hard_end.saturating_sub(tolerance));

        let paragraph = |b: usize| b >= start + 2 && chars[b - 1] == '\n' && chars[b - 2] == '\n';
        let line = |b: usize| chars[b - 1] == '\n';
        let sentence = |b: usize| matches!(chars[b - 1], '.' | '!' | '?') && chars[b].is_whitespace();
        let word = |b: usize| chars[b].is_whitespace();

        let candidates: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &word];
        candidates
            .iter()
            .find_map(|accept| (lo..=hard_end).rev().find(|&b| accept(b)))
            .unwrap_or(hard_end)
    }

    /// Start of the passage following one that ended at `end`
    fn next_start(&self, start: usize, end: usize) -> usize {
        let chars = &self.chars;
        let mut next = end.saturating_sub(self.overlap).max(start + 1);

        // Overlap landed mid-word: move to the next word start inside the overlap,
        // or drop the overlap entirely when it is a single unbroken word
        if next < end && !chars[next - 1].is_whitespace() && !chars[next].is_whitespace() {
            next = (next + 1..end)
                .find(|&i| chars[i - 1].is_whitespace() && !chars[i].is_whitespace())
                .unwrap_or(end);
        }

        next
    }
}

impl Iterator for Chunks<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        let len = self.chars.len();
        let mut start = self.position;
        while start < len && self.chars[start].is_whitespace() {
            start += 1;
        }
        if start >= len {
            self.position = len;
            return None;
        }

        let hard_end = start + self.max_chunk_size;
        let end = if hard_end >= len {
            len
        } else {
            self.find_break(start, hard_end)
        };

        let raw: String = self.chars[start..end].iter().collect();
        let text = raw.trim_end().to_string();

        let passage = Passage {
            id: PassageId::new(self.document.id.clone(), self.sequence),
            start_offset: start,
            char_len: text.chars().count(),
            token_count: estimate_token_count(&text),
            page: self.document.page_at(start),
            text,
        };

        self.sequence += 1;
        self.position = if end >= len {
            len
        } else {
            self.next_start(start, end)
        };

        Some(passage)
    }
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
