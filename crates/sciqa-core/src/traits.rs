use crate::error::Result;
use crate::types::SparseVector;

/// Text → fixed-length, L2-normalised vector.
pub trait DenseEncoder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn encode_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Text → term-index weights with non-negative values.
pub trait SparseEncoder: Send + Sync {
    fn encode_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>>;
}
