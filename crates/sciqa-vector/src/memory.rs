use std::collections::HashMap;

use async_trait::async_trait;
use sciqa_core::types::{Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::fusion::fuse_points;
use crate::{prefetch_width, VectorStore};

struct Collection {
    dim: usize,
    points: HashMap<Uuid, Point>,
}

/// Exact-search store held in memory. Used by tests and small corpora.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn top(mut scored: Vec<ScoredPoint>, n: usize) -> Vec<ScoredPoint> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    scored.truncate(n);
    scored
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str, dense_dim: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dim: dense_dim, points: HashMap::new() });
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        if let Some(bad) = points.iter().find(|p| p.dense.len() != coll.dim) {
            return Err(Error::InvalidRecord(format!(
                "point {} has {} dims, collection '{name}' expects {}",
                bad.id,
                bad.dense.len(),
                coll.dim
            )));
        }
        for p in points {
            coll.points.insert(p.id, p.clone());
        }
        debug!(collection = name, count = points.len(), "upserted points");
        Ok(())
    }

    async fn fused_search(
        &self,
        name: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        let width = prefetch_width(limit);

        let dense_hits = top(
            coll.points
                .values()
                .map(|p| ScoredPoint { id: p.id, score: cosine(dense, &p.dense), payload: p.payload.clone() })
                .collect(),
            width,
        );
        let sparse_hits = top(
            coll.points
                .values()
                .filter_map(|p| {
                    let score = sparse.dot(&p.sparse);
                    (score > 0.0).then(|| ScoredPoint { id: p.id, score, payload: p.payload.clone() })
                })
                .collect(),
            width,
        );
        Ok(fuse_points(dense_hits, sparse_hits, limit))
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map_or(0, |c| c.points.len()))
    }
}
