use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use sciqa_core::traits::{DenseEncoder, SparseEncoder};
use sciqa_core::types::SparseVector;
use sciqa_core::Result;
use twox_hash::XxHash64;

/// Vocabulary size of the BERT uncased tokenizer, the SPLADE index space.
pub const FAKE_VOCAB: u64 = 30522;

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
}

fn hash_token(token: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    token.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic token-hash embedder. No model files needed.
pub struct FakeDenseEncoder {
    dim: usize,
    max_len: usize,
}

impl FakeDenseEncoder {
    pub fn new(dim: usize, max_len: usize) -> Self {
        Self { dim: dim.max(1), max_len }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text).take(self.max_len) {
            let h = hash_token(&token);
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }
}

impl DenseEncoder for FakeDenseEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn encode_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Term-frequency sparse encoder over hashed tokens.
pub struct FakeSparseEncoder {
    top_k: usize,
}

impl FakeSparseEncoder {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    fn encode_one(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokens(text) {
            *counts.entry((hash_token(&token) % FAKE_VOCAB) as u32).or_default() += 1.0;
        }
        let mut pairs: Vec<(u32, f32)> = counts.into_iter().map(|(i, c)| (i, c.ln_1p())).collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        pairs.truncate(self.top_k);
        SparseVector::from_pairs(pairs)
    }
}

impl SparseEncoder for FakeSparseEncoder {
    fn encode_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}
