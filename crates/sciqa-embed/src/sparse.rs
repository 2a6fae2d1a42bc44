use std::path::Path;

use candle_core::{Device, Tensor};
use candle_transformers::models::bert::BertForMaskedLM;
use sciqa_core::traits::SparseEncoder;
use sciqa_core::types::SparseVector;
use sciqa_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::model::load_model_files;
use crate::pool::splade_max;
use crate::tokenize::{pad_id, tokenize_batch};

const NAME: &str = "sparse";

/// SPLADE encoder on a candle masked-LM head.
pub struct SpladeEncoder {
    model: BertForMaskedLM,
    tokenizer: Tokenizer,
    device: Device,
    pad: u32,
    max_len: usize,
    batch_size: usize,
    top_k: usize,
}

impl SpladeEncoder {
    pub fn load(dir: &Path, device: Device, max_len: usize, batch_size: usize, top_k: usize) -> Result<Self> {
        let files = load_model_files(dir, &device, NAME)?;
        let model = BertForMaskedLM::load(files.weights, &files.config).map_err(|e| Error::encoding(NAME, e))?;
        let pad = pad_id(&files.tokenizer);
        Ok(Self { model, tokenizer: files.tokenizer, device, pad, max_len, batch_size: batch_size.max(1), top_k })
    }

    fn encode_batch(&self, texts: &[String]) -> candle_core::Result<Tensor> {
        let batch = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad, &self.device, NAME)
            .map_err(candle_core::Error::wrap)?;
        let logits = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        splade_max(&logits, &batch.attention_mask)
    }
}

/// Keep the `top_k` largest positive weights of a dense vocabulary row.
pub fn top_k_terms(row: &[f32], top_k: usize) -> SparseVector {
    let mut pairs: Vec<(u32, f32)> = row
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0.0)
        .map(|(i, w)| (i as u32, *w))
        .collect();
    if pairs.len() > top_k {
        pairs.select_nth_unstable_by(top_k, |a, b| b.1.total_cmp(&a.1));
        pairs.truncate(top_k);
    }
    SparseVector::from_pairs(pairs)
}

impl SparseEncoder for SpladeEncoder {
    fn encode_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let weights = self.encode_batch(chunk).map_err(|e| Error::encoding(NAME, e))?;
            let rows: Vec<Vec<f32>> = weights
                .to_device(&Device::Cpu)
                .and_then(|t| t.to_vec2())
                .map_err(|e| Error::encoding(NAME, e))?;
            out.extend(rows.iter().map(|row| top_k_terms(row, self.top_k)));
        }
        debug!(texts = texts.len(), "sparse batch encoded");
        Ok(out)
    }
}
