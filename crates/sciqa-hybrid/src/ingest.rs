//! Batch ingestion: records → (dense, sparse) → points → store.
//!
//! Offsets count every record of the input stream, empty ones included, so an
//! operator can resume a failed run by passing the reported offset back as
//! `start`. Re-ingesting a record overwrites the same point. A single writer
//! per collection is assumed.

use std::path::Path;
use std::sync::Arc;

use sciqa_core::corpus::{list_corpus_files, read_records};
use sciqa_core::types::{ChunkRecord, EncodedChunk, Point};
use sciqa_core::{Error, Result};
use sciqa_embed::DualEncoder;
use sciqa_vector::VectorStore;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { batch_size: 16 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records read after the start offset.
    pub seen: usize,
    pub skipped_empty: usize,
    pub written: usize,
    pub batches: usize,
    /// Offset to pass as `start` to continue after this run.
    pub next_offset: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: &IngestReport) {
        self.seen += other.seen;
        self.skipped_empty += other.skipped_empty;
        self.written += other.written;
        self.batches += other.batches;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusReport {
    pub files: usize,
    /// Index of the file after the last one ingested.
    pub next_file: usize,
    pub records: IngestReport,
}

/// Ingestion stopped; everything before `offset` (in file `file_index`, when
/// ingesting a corpus directory) is stored.
#[derive(Debug, thiserror::Error)]
#[error("ingestion stopped at offset {offset}{}: {source}", .file_index.map(|f| format!(" of file {f}")).unwrap_or_default())]
pub struct IngestError {
    pub file_index: Option<usize>,
    pub offset: usize,
    #[source]
    pub source: Error,
    pub report: IngestReport,
}

type BatchHook = Box<dyn Fn(&IngestReport) + Send + Sync>;

pub struct IngestionPipeline {
    encoder: Arc<DualEncoder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    options: IngestOptions,
    on_batch: Option<BatchHook>,
}

impl IngestionPipeline {
    pub fn new(
        encoder: Arc<DualEncoder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        options: IngestOptions,
    ) -> Self {
        Self { encoder, store, collection: collection.into(), options, on_batch: None }
    }

    /// Called after every stored batch with the running report.
    pub fn on_batch(mut self, hook: impl Fn(&IngestReport) + Send + Sync + 'static) -> Self {
        self.on_batch = Some(Box::new(hook));
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn encode(&self, records: Vec<ChunkRecord>) -> Result<Vec<Point>> {
        let encoder = Arc::clone(&self.encoder);
        let texts: Vec<String> = records.iter().map(|r| r.body().trim().to_string()).collect();
        let vectors = tokio::task::spawn_blocking(move || encoder.encode(&texts))
            .await
            .map_err(|e| Error::encoding("dual", e))??;
        Ok(records
            .into_iter()
            .zip(vectors)
            .map(|(record, (dense, sparse))| EncodedChunk { record, dense, sparse }.into_point())
            .collect())
    }

    async fn flush(&self, batch: Vec<ChunkRecord>, report: &mut IngestReport) -> Result<()> {
        let n = batch.len();
        let points = self.encode(batch).await?;
        self.store.upsert(&self.collection, &points).await?;
        report.written += n;
        report.batches += 1;
        debug!(collection = %self.collection, batch = report.batches, written = report.written, "batch stored");
        if let Some(hook) = &self.on_batch {
            hook(report);
        }
        Ok(())
    }

    /// Ingest `records`, skipping the first `start`.
    pub async fn ingest<I>(&self, records: I, start: usize) -> std::result::Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = ChunkRecord>,
    {
        let mut report = IngestReport { next_offset: start, ..Default::default() };
        let fail = |offset: usize, source: Error, report: &IngestReport| IngestError {
            file_index: None,
            offset,
            source,
            report: report.clone(),
        };
        self.store
            .ensure_collection(&self.collection, self.encoder.dim())
            .await
            .map_err(|e| fail(start, e, &report))?;

        let batch_size = self.options.batch_size.max(1);
        let mut batch: Vec<ChunkRecord> = Vec::with_capacity(batch_size);
        let mut batch_start = start;
        for (offset, mut record) in records.into_iter().enumerate().skip(start) {
            report.seen += 1;
            if batch.is_empty() {
                batch_start = offset;
            }
            if record.body().trim().is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            record.ensure_id();
            batch.push(record);
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                self.flush(full, &mut report).await.map_err(|e| {
                    warn!(collection = %self.collection, offset = batch_start, error = %e, "ingestion stopped");
                    fail(batch_start, e, &report)
                })?;
                report.next_offset = offset + 1;
            }
        }
        if !batch.is_empty() {
            self.flush(batch, &mut report).await.map_err(|e| {
                warn!(collection = %self.collection, offset = batch_start, error = %e, "ingestion stopped");
                fail(batch_start, e, &report)
            })?;
        }
        report.next_offset = start + report.seen;
        info!(
            collection = %self.collection,
            seen = report.seen,
            written = report.written,
            skipped_empty = report.skipped_empty,
            batches = report.batches,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Ingest every `*.jsonl` under `dir` in name order, starting at file `start_file`.
    pub async fn ingest_corpus(&self, dir: &Path, start_file: usize) -> std::result::Result<CorpusReport, IngestError> {
        let files = list_corpus_files(dir);
        info!(dir = %dir.display(), files = files.len(), start_file, "ingesting corpus");
        let mut total = CorpusReport { next_file: start_file, ..Default::default() };
        for (file_index, path) in files.iter().enumerate().skip(start_file) {
            let records = read_records(path).map_err(|source| IngestError {
                file_index: Some(file_index),
                offset: 0,
                source,
                report: total.records.clone(),
            })?;
            let report = self.ingest(records, 0).await.map_err(|mut e| {
                e.file_index = Some(file_index);
                e
            })?;
            debug!(file = %path.display(), written = report.written, "file ingested");
            total.records.absorb(&report);
            total.files += 1;
            total.next_file = file_index + 1;
        }
        Ok(total)
    }
}
