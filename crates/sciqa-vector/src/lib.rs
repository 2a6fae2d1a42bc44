//! Hybrid (dense + sparse) vector storage with rank fusion.
//!
//! Every backend keeps two named vector fields per point, `dense` (cosine)
//! and `sparse` (dot product), runs one search per field with a widened
//! prefetch and fuses the two rankings with RRF.

pub mod fusion;
pub mod lance;
pub mod memory;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod retry;
mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use sciqa_core::config::{expand_path, StoreBackend, StoreSettings};
use sciqa_core::types::{Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, Result};

pub use fusion::{fuse_points, reciprocal_rank_fusion, RRF_K};
pub use lance::LanceStore;
pub use memory::MemoryStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantStore;
pub use retry::{RetryPolicy, RetryingStore};

pub const DENSE_FIELD: &str = "dense";
pub const SPARSE_FIELD: &str = "sparse";

/// Each source search fetches `limit * PREFETCH_FACTOR` candidates before fusion.
pub const PREFETCH_FACTOR: usize = 4;

pub fn prefetch_width(limit: usize) -> usize {
    limit.max(1) * PREFETCH_FACTOR
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection when missing; a no-op otherwise.
    async fn ensure_collection(&self, name: &str, dense_dim: usize) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()>;

    /// RRF over a dense and a sparse search, best first, at most `limit` results.
    async fn fused_search(
        &self,
        name: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, name: &str) -> Result<usize>;
}

/// Backend named in `settings`, wrapped in the write retry policy.
pub async fn open_store(settings: &StoreSettings) -> Result<Arc<dyn VectorStore>> {
    let backend: Arc<dyn VectorStore> = match settings.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Lance => {
            let path = expand_path(&settings.url);
            Arc::new(LanceStore::open(&path.to_string_lossy()).await?)
        }
        #[cfg(feature = "qdrant")]
        StoreBackend::Qdrant => Arc::new(QdrantStore::connect(settings)?),
        #[cfg(not(feature = "qdrant"))]
        StoreBackend::Qdrant => {
            return Err(Error::InvalidConfig("qdrant backend requires the `qdrant` feature".into()))
        }
    };
    Ok(Arc::new(RetryingStore::new(backend, RetryPolicy::from_settings(settings))))
}
