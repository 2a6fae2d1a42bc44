use std::sync::Arc;
use std::time::Duration;

use sciqa_core::types::{strip_header, RetrievedDocument, ScoredPoint};
use sciqa_core::{Error, Result};
use sciqa_embed::DualEncoder;
use sciqa_vector::VectorStore;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 15;
const UNKNOWN_SECTION: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub default_k: usize,
    pub query_timeout: Duration,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self { default_k: DEFAULT_TOP_K, query_timeout: Duration::from_secs(90) }
    }
}

/// Query → dual encoding → fused store search → documents with bodies only.
pub struct HybridRetriever {
    encoder: Arc<DualEncoder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    options: RetrieverOptions,
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn to_document(point: ScoredPoint) -> RetrievedDocument {
    let text = payload_str(&point.payload, "text").map(strip_header).unwrap_or_default().to_string();
    let section = payload_str(&point.payload, "section").unwrap_or(UNKNOWN_SECTION).to_string();
    let chunk_id = payload_str(&point.payload, "id").map_or_else(|| point.id.to_string(), str::to_string);
    RetrievedDocument { chunk_id, score: point.score, text, section, full_payload: point.payload }
}

impl HybridRetriever {
    pub fn new(
        encoder: Arc<DualEncoder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        options: RetrieverOptions,
    ) -> Self {
        Self { encoder, store, collection: collection.into(), options }
    }

    pub fn default_k(&self) -> usize {
        self.options.default_k
    }

    /// At most `k` documents, best first. Empty when nothing matches.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let encoder = Arc::clone(&self.encoder);
        let text = query.to_string();
        let (dense, sparse) = tokio::task::spawn_blocking(move || encoder.encode_one(&text))
            .await
            .map_err(|e| Error::encoding("dual", e))??;
        let search = self.store.fused_search(&self.collection, &dense, &sparse, k);
        let points = tokio::time::timeout(self.options.query_timeout, search)
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("search on '{}'", self.collection),
                seconds: self.options.query_timeout.as_secs(),
            })??;
        let docs: Vec<RetrievedDocument> = points.into_iter().take(k).map(to_document).collect();
        if docs.is_empty() {
            info!(collection = %self.collection, "no documents retrieved");
        } else {
            debug!(collection = %self.collection, k, returned = docs.len(), "retrieved documents");
        }
        Ok(docs)
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        self.retrieve(query, self.options.default_k).await
    }
}
