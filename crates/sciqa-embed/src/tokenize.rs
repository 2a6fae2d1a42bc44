use candle_core::{Device, Tensor};
use sciqa_core::{Error, Result};
use tokenizers::Tokenizer;

/// Padded model inputs for one batch, all `[B,T]`.
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Id of `[PAD]` in the vocabulary, 0 when absent.
pub fn pad_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer.token_to_id("[PAD]").unwrap_or(0)
}

/// Tokenize `texts`, truncate each to `max_len` and pad to the longest sequence in the batch.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad: u32,
    device: &Device,
    encoder: &str,
) -> Result<TokenBatch> {
    let mut rows: Vec<(Vec<u32>, Vec<u32>)> = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer
            .encode(text.as_str(), true)
            .map_err(|e| Error::encoding(encoder, format!("tokenization failed: {e}")))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        ids.truncate(max_len);
        mask.truncate(max_len);
        rows.push((ids, mask));
    }
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
    let mut flat_ids = Vec::with_capacity(rows.len() * width);
    let mut flat_mask = Vec::with_capacity(rows.len() * width);
    for (mut ids, mut mask) in rows {
        ids.resize(width, pad);
        mask.resize(width, 0);
        flat_ids.extend(ids);
        flat_mask.extend(mask);
    }
    let shape = (texts.len(), width);
    let tensor_err = |e: candle_core::Error| Error::encoding(encoder, e);
    let input_ids = Tensor::from_vec(flat_ids, shape, device).map_err(tensor_err)?;
    let attention_mask = Tensor::from_vec(flat_mask, shape, device).map_err(tensor_err)?;
    let token_type_ids = input_ids.zeros_like().map_err(tensor_err)?;
    Ok(TokenBatch { input_ids, attention_mask, token_type_ids })
}
