use std::path::Path;

use candle_core::{Device, Tensor};
use candle_transformers::models::bert::BertModel;
use sciqa_core::config::Pooling;
use sciqa_core::traits::DenseEncoder;
use sciqa_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::model::load_model_files;
use crate::pool::{cls_l2, masked_mean_l2};
use crate::tokenize::{pad_id, tokenize_batch};

const NAME: &str = "dense";

/// BGE-style sentence encoder on a candle `BertModel`.
pub struct BertDenseEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad: u32,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    pooling: Pooling,
}

impl BertDenseEncoder {
    pub fn load(
        dir: &Path,
        device: Device,
        dim: usize,
        max_len: usize,
        batch_size: usize,
        pooling: Pooling,
    ) -> Result<Self> {
        let files = load_model_files(dir, &device, NAME)?;
        if files.config.hidden_size != dim {
            return Err(Error::encoding(
                NAME,
                format!("model hidden size {} does not match configured dimension {dim}", files.config.hidden_size),
            ));
        }
        let model = BertModel::load(files.weights, &files.config).map_err(|e| Error::encoding(NAME, e))?;
        let pad = pad_id(&files.tokenizer);
        Ok(Self { model, tokenizer: files.tokenizer, device, pad, dim, max_len, batch_size: batch_size.max(1), pooling })
    }

    fn encode_batch(&self, texts: &[String]) -> candle_core::Result<Tensor> {
        let batch = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad, &self.device, NAME)
            .map_err(candle_core::Error::wrap)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        match self.pooling {
            Pooling::Cls => cls_l2(&hidden),
            Pooling::Mean => masked_mean_l2(&hidden, &batch.attention_mask),
        }
    }
}

impl DenseEncoder for BertDenseEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn encode_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let pooled = self.encode_batch(chunk).map_err(|e| Error::encoding(NAME, e))?;
            let rows: Vec<Vec<f32>> = pooled
                .to_device(&Device::Cpu)
                .and_then(|t| t.to_vec2())
                .map_err(|e| Error::encoding(NAME, e))?;
            if let Some(bad) = rows.iter().find(|r| r.len() != self.dim) {
                return Err(Error::encoding(NAME, format!("expected {} dims, got {}", self.dim, bad.len())));
            }
            out.extend(rows);
        }
        debug!(texts = texts.len(), "dense batch encoded");
        Ok(out)
    }
}
