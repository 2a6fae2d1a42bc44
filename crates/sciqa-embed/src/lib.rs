//! Dual (dense + sparse) text encoding for hybrid retrieval.
//!
//! Real encoders run BERT-family models through candle; the fake encoders
//! hash tokens and are used by tests and by `APP_USE_FAKE_EMBEDDINGS=1`.

mod device;
mod model;
mod tokenize;

pub mod dense;
pub mod fake;
pub mod pool;
pub mod sparse;

use sciqa_core::config::EncoderSettings;
use sciqa_core::traits::{DenseEncoder, SparseEncoder};
use sciqa_core::types::SparseVector;
use sciqa_core::{Error, Result};
use tracing::info;

pub use dense::BertDenseEncoder;
pub use device::select_device;
pub use fake::{FakeDenseEncoder, FakeSparseEncoder};
pub use pool::{cls_l2, l2_normalize, masked_mean_l2, splade_max};
pub use sparse::SpladeEncoder;

/// One dense and one sparse encoder applied to the same texts.
pub struct DualEncoder {
    dense: Box<dyn DenseEncoder>,
    sparse: Box<dyn SparseEncoder>,
}

impl DualEncoder {
    pub fn new(dense: Box<dyn DenseEncoder>, sparse: Box<dyn SparseEncoder>) -> Self {
        Self { dense, sparse }
    }

    pub fn fake(dim: usize) -> Self {
        Self::new(Box::new(FakeDenseEncoder::new(dim, 256)), Box::new(FakeSparseEncoder::new(200)))
    }

    pub fn dim(&self) -> usize {
        self.dense.dim()
    }

    /// Both vectors for every text, in input order.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<(Vec<f32>, SparseVector)>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let dense = self.dense.encode_dense(texts)?;
        let sparse = self.sparse.encode_sparse(texts)?;
        if dense.len() != texts.len() || sparse.len() != texts.len() {
            return Err(Error::encoding(
                "dual",
                format!("{} texts produced {} dense and {} sparse vectors", texts.len(), dense.len(), sparse.len()),
            ));
        }
        let dim = self.dim();
        if let Some(bad) = dense.iter().find(|v| v.len() != dim) {
            return Err(Error::encoding("dense", format!("expected {dim} dims, got {}", bad.len())));
        }
        Ok(dense.into_iter().zip(sparse).collect())
    }

    pub fn encode_one(&self, text: &str) -> Result<(Vec<f32>, SparseVector)> {
        self.encode(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::encoding("dual", "no vectors returned"))
    }
}

/// Encoders described by `settings`; fakes when requested.
pub fn get_default_encoders(settings: &EncoderSettings) -> Result<DualEncoder> {
    if settings.fake_requested() {
        info!(dim = settings.dense_dim, "using fake encoders");
        return Ok(DualEncoder::new(
            Box::new(FakeDenseEncoder::new(settings.dense_dim, settings.max_len)),
            Box::new(FakeSparseEncoder::new(settings.sparse_top_k)),
        ));
    }
    let device = select_device();
    let dense_dir = model::resolve_model_dir(&settings.dense_model_dir, "dense")?;
    let sparse_dir = model::resolve_model_dir(&settings.sparse_model_dir, "sparse")?;
    let dense = BertDenseEncoder::load(
        &dense_dir,
        device.clone(),
        settings.dense_dim,
        settings.max_len,
        settings.batch_size,
        settings.pooling,
    )?;
    let sparse = SpladeEncoder::load(&sparse_dir, device, settings.max_len, settings.batch_size, settings.sparse_top_k)?;
    Ok(DualEncoder::new(Box::new(dense), Box::new(sparse)))
}
