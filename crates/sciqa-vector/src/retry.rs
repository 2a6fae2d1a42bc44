use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sciqa_core::config::StoreSettings;
use sciqa_core::types::{Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, Result};
use tracing::warn;

use crate::VectorStore;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub write_timeout: Duration,
    pub upload_batch_size: usize,
}

impl RetryPolicy {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            base_backoff: settings.retry_backoff(),
            write_timeout: settings.write_timeout(),
            upload_batch_size: settings.upload_batch_size.max(1),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_backoff.saturating_mul(1u32 << exp)
    }
}

/// Retries transient upsert failures with exponential backoff and splits
/// writes into `upload_batch_size` chunks. Queries pass through unchanged.
pub struct RetryingStore {
    inner: Arc<dyn VectorStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn VectorStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn upsert_chunk(&self, name: &str, points: &[Point]) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.policy.write_timeout, self.inner.upsert(name, points)).await {
                Ok(r) => r,
                Err(_) => Err(Error::Timeout { operation: "upsert".into(), seconds: self.policy.write_timeout.as_secs() }),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(collection = name, attempt, delay_ms = delay.as_millis() as u64, error = %e, "upsert failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::StoreWrite {
                        collection: name.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl VectorStore for RetryingStore {
    async fn ensure_collection(&self, name: &str, dense_dim: usize) -> Result<()> {
        self.inner.ensure_collection(name, dense_dim).await
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()> {
        for chunk in points.chunks(self.policy.upload_batch_size.max(1)) {
            self.upsert_chunk(name, chunk).await?;
        }
        Ok(())
    }

    async fn fused_search(
        &self,
        name: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.inner.fused_search(name, dense, sparse, limit).await
    }

    async fn count(&self, name: &str) -> Result<usize> {
        self.inner.count(name).await
    }
}
