use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sciqa_core::identity::chunk_id;
use sciqa_core::types::{ChunkRecord, Point, ScoredPoint, SparseVector};
use sciqa_core::{Error, ErrorKind, Result};
use sciqa_embed::DualEncoder;
use sciqa_hybrid::{HybridRetriever, IngestOptions, IngestionPipeline, RetrieverOptions};
use sciqa_vector::{MemoryStore, VectorStore};

const COLLECTION: &str = "nasa_corpus_test";

fn record(i: usize, body: &str) -> ChunkRecord {
    let pmcid = format!("PMC{}", 1000 + i / 10);
    let section_path = format!("Study {i} — Results");
    let url = format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmcid}/");
    ChunkRecord {
        id: chunk_id(&pmcid, &section_path, body),
        section: "Results".into(),
        text: format!("{section_path}\n{url} | {pmcid} | PMID:{i} | DOI:10.1/{i}\n{body}"),
        section_path,
        url,
        pmcid,
        ..Default::default()
    }
}

fn corpus(n: usize) -> Vec<ChunkRecord> {
    (0..n).map(|i| record(i, &format!("finding {i} about topic{} in spaceflight", i % 7))).collect()
}

fn encoder() -> Arc<DualEncoder> {
    Arc::new(DualEncoder::fake(64))
}

/// Fails every upsert after the first `ok_calls`.
struct FailAfter {
    inner: MemoryStore,
    ok_calls: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl VectorStore for FailAfter {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
        self.inner.ensure_collection(name, dim).await
    }
    async fn upsert(&self, name: &str, points: &[Point]) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls.load(Ordering::SeqCst) {
            return Err(Error::StoreWrite { collection: name.into(), attempts: 5, message: "unavailable".into() });
        }
        self.inner.upsert(name, points).await
    }
    async fn fused_search(&self, n: &str, d: &[f32], s: &SparseVector, l: usize) -> Result<Vec<ScoredPoint>> {
        self.inner.fused_search(n, d, s, l).await
    }
    async fn count(&self, name: &str) -> Result<usize> {
        self.inner.count(name).await
    }
}

struct Slow;

#[async_trait]
impl VectorStore for Slow {
    async fn ensure_collection(&self, _: &str, _: usize) -> Result<()> {
        Ok(())
    }
    async fn upsert(&self, _: &str, _: &[Point]) -> Result<()> {
        Ok(())
    }
    async fn fused_search(&self, _: &str, _: &[f32], _: &SparseVector, _: usize) -> Result<Vec<ScoredPoint>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
    async fn count(&self, _: &str) -> Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn ingest_then_retrieve_respects_k() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(encoder(), store.clone(), COLLECTION, IngestOptions { batch_size: 8 });
    let report = pipeline.ingest(corpus(40), 0).await.unwrap();
    assert_eq!(report.written, 40);
    assert_eq!(report.batches, 5);
    assert_eq!(report.next_offset, 40);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 40);

    let retriever = HybridRetriever::new(encoder(), store, COLLECTION, RetrieverOptions::default());
    let docs = retriever.retrieve("topic3 spaceflight", 5).await.unwrap();
    assert_eq!(docs.len(), 5);
    assert!(docs.iter().all(|d| !d.text.contains("PMID:")));
    assert!(docs.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(docs[0].text.contains("topic3"));

    let all = retriever.retrieve_default("topic3 spaceflight").await.unwrap();
    assert_eq!(all.len(), 15);
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_queries_share_one_runtime_thread() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    IngestionPipeline::new(encoder(), store.clone(), COLLECTION, IngestOptions::default())
        .ingest(corpus(20), 0)
        .await
        .unwrap();
    let retriever = Arc::new(HybridRetriever::new(encoder(), store, COLLECTION, RetrieverOptions::default()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.retrieve(&format!("topic{i} spaceflight"), 3).await })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let docs = handle.await.unwrap().unwrap();
        assert_eq!(docs.len(), 3);
        let alone = retriever.retrieve(&format!("topic{i} spaceflight"), 3).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| &d.chunk_id).collect();
        let expected: Vec<_> = alone.iter().map(|d| &d.chunk_id).collect();
        assert_eq!(ids, expected);
    }
}

#[tokio::test]
async fn empty_inputs_return_no_documents() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    store.ensure_collection(COLLECTION, 64).await.unwrap();
    let retriever = HybridRetriever::new(encoder(), store, COLLECTION, RetrieverOptions::default());
    assert!(retriever.retrieve("anything at all", 15).await.unwrap().is_empty());
    assert!(retriever.retrieve("   ", 15).await.unwrap().is_empty());
    assert!(retriever.retrieve("anything", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_records_are_skipped_but_counted() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(encoder(), store.clone(), COLLECTION, IngestOptions { batch_size: 4 });
    let mut records = corpus(5);
    records[2].text = String::new();
    records[3].text = "T — S\nprov\n   ".into();
    let report = pipeline.ingest(records, 0).await.unwrap();
    assert_eq!(report.seen, 5);
    assert_eq!(report.skipped_empty, 2);
    assert_eq!(report.written, 3);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 3);
}

#[tokio::test]
async fn reingest_is_idempotent() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(encoder(), store.clone(), COLLECTION, IngestOptions::default());
    pipeline.ingest(corpus(20), 0).await.unwrap();
    pipeline.ingest(corpus(20), 0).await.unwrap();
    assert_eq!(store.count(COLLECTION).await.unwrap(), 20);
}

#[tokio::test]
async fn resume_after_failure_matches_single_pass() {
    let records = corpus(100);

    let reference: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    IngestionPipeline::new(encoder(), reference.clone(), COLLECTION, IngestOptions { batch_size: 10 })
        .ingest(records.clone(), 0)
        .await
        .unwrap();

    let flaky = Arc::new(FailAfter { inner: MemoryStore::new(), ok_calls: AtomicUsize::new(5), calls: AtomicUsize::new(0) });
    let pipeline = IngestionPipeline::new(encoder(), flaky.clone(), COLLECTION, IngestOptions { batch_size: 10 });
    let err = pipeline.ingest(records.clone(), 0).await.unwrap_err();
    assert_eq!(err.offset, 50);
    assert_eq!(err.source.kind(), ErrorKind::StoreWrite);
    assert_eq!(err.report.written, 50);
    assert_eq!(flaky.count(COLLECTION).await.unwrap(), 50);

    flaky.ok_calls.store(usize::MAX, Ordering::SeqCst);
    let healthy: Arc<dyn VectorStore> = flaky;
    let resumed = IngestionPipeline::new(encoder(), healthy.clone(), COLLECTION, IngestOptions { batch_size: 10 })
        .ingest(records.clone(), err.offset)
        .await
        .unwrap();
    assert_eq!(resumed.written, 50);
    assert_eq!(resumed.next_offset, 100);
    assert_eq!(healthy.count(COLLECTION).await.unwrap(), reference.count(COLLECTION).await.unwrap());

    let r1 = HybridRetriever::new(encoder(), reference, COLLECTION, RetrieverOptions::default());
    let r2 = HybridRetriever::new(encoder(), healthy, COLLECTION, RetrieverOptions::default());
    let a: Vec<String> = r1.retrieve("topic5", 10).await.unwrap().into_iter().map(|d| d.chunk_id).collect();
    let b: Vec<String> = r2.retrieve("topic5", 10).await.unwrap().into_iter().map(|d| d.chunk_id).collect();
    assert_eq!(a, b);
}

#[tokio::test]
async fn progress_hook_sees_every_batch() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(encoder(), store, COLLECTION, IngestOptions { batch_size: 4 })
        .on_batch(move |r| sink.lock().unwrap().push(r.written));
    pipeline.ingest(corpus(10), 0).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![4, 8, 10]);
}

#[tokio::test]
async fn corpus_directory_resumes_by_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    for (name, range) in [("a.jsonl", 0..3), ("b.jsonl", 3..5), ("c.jsonl", 5..9)] {
        let lines: Vec<String> = corpus(9)[range].iter().map(|r| serde_json::to_string(r).unwrap()).collect();
        std::fs::write(tmp.path().join(name), lines.join("\n")).unwrap();
    }
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(encoder(), store.clone(), COLLECTION, IngestOptions::default());
    let report = pipeline.ingest_corpus(tmp.path(), 1).await.unwrap();
    assert_eq!(report.files, 2);
    assert_eq!(report.next_file, 3);
    assert_eq!(report.records.written, 6);
    assert_eq!(store.count(COLLECTION).await.unwrap(), 6);
}

#[tokio::test]
async fn slow_store_times_out() {
    let retriever = HybridRetriever::new(
        encoder(),
        Arc::new(Slow),
        COLLECTION,
        RetrieverOptions { default_k: 15, query_timeout: Duration::from_millis(20) },
    );
    let err = retriever.retrieve("radiation", 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}
