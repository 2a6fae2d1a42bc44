use candle_core::{DType, IndexOp, Result, Tensor};

fn eps_for(dtype: DType) -> f32 {
    match dtype {
        DType::F16 | DType::BF16 => 1e-6,
        _ => 1e-12,
    }
}

/// Row-wise L2 normalisation of a `[B,H]` tensor.
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let eps = Tensor::new(&[eps_for(x.dtype())], x.device())?.to_dtype(x.dtype())?.unsqueeze(0)?;
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    x.broadcast_div(&norm)
}

/// Mean of the unmasked token states, L2-normalised. `hidden` is `[B,T,H]`, mask `[B,T]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (_batch, _time, hidden_dim) = hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = mask_3d
        .broadcast_as(hidden.shape())
        .or_else(|_| mask_3d.repeat((1, 1, hidden_dim)))?;
    let sum = (hidden * &mask_broadcast)?.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    let mean = sum.broadcast_div(&lengths)?;
    l2_normalize(&mean)
}

/// First-token (`[CLS]`) state, L2-normalised.
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let _ = hidden.dims3()?;
    l2_normalize(&hidden.i((.., 0))?.contiguous()?)
}

/// SPLADE term weights: `max_t log(1 + relu(logits[b,t,v])) * mask[b,t]`, shape `[B,V]`.
pub fn splade_max(logits: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_device(logits.device())?.to_dtype(logits.dtype())?.unsqueeze(2)?;
    let activated = logits.relu()?.affine(1.0, 1.0)?.log()?;
    activated.broadcast_mul(&mask)?.max(1)
}
