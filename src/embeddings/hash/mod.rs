//! Offline embedder based on feature hashing.
//!
//! Texts sharing words land close together, which is enough to exercise the
//! whole pipeline without a model server. Vectors are a pure function of the
//! input text and dimension. Text without any words is hashed character by
//! character.


use itertools::Itertools;

use super::{Embedder, validate_inputs, validate_outputs};
use crate::{RagError, Result};

/// Model identifier recorded in index headers built with this backend
pub const HASH_MODEL_ID: &str = "feature-hash-v1";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
    max_input_tokens: usize,
}

impl HashEmbedder {
    #[inline]
    pub fn new(dimension: usize, max_input_tokens: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Configuration(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            max_input_tokens,
        })
    }

    fn embed_text(&self, index: usize, text: &str) -> Result<Vec<f32>> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut vector = vec![0.0_f32; self.dimension];

        // Punctuation-only text such as a divider line
        if words.is_empty() {
            let mut buf = [0_u8; 4];
            for c in text.chars().filter(|c| !c.is_whitespace()) {
                self.add_feature(&mut vector, c.encode_utf8(&mut buf).as_bytes(), 1.0);
            }
        }
        for word in &words {
            self.add_feature(&mut vector, word.as_bytes(), 1.0);
        }
        for (first, second) in words.iter().tuple_windows() {
            let bigram = format!("{first} {second}");
            self.add_feature(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every feature cancelled out against another
            return Err(RagError::Embedding(format!(
                "Input {index} hashed to a zero vector"
            )));
        }
        vector.iter_mut().for_each(|v| *v /= norm);

        Ok(vector)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        HASH_MODEL_ID
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        validate_inputs(texts, self.max_input_tokens)?;

        let vectors = texts
            .iter()
            .enumerate()
            .map(|(i, text)| self.embed_text(i, text))
            .collect::<Result<Vec<_>>>()?;

        validate_outputs(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}
