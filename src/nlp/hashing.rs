use anyhow::Result;
use std::collections::HashMap;

use super::Embedder;

/// Deterministic hashed term-frequency embedder.
///
/// Terms are hashed into fixed-dimension buckets with FNV-1a and weighted by
/// frequency, then L2-normalised. Text without any alphanumeric term maps to
/// the zero vector, which the memory store refuses to persist.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return Ok(vec);
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in tf {
            vec[Self::hash_term(term, self.dimensions)] += count / total;
        }

        let norm = super::l2_norm(&vec);
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}
