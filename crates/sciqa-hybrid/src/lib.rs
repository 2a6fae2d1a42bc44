//! Ingestion and retrieval over a hybrid vector store.

pub mod ingest;
pub mod retriever;

pub use ingest::{CorpusReport, IngestError, IngestOptions, IngestReport, IngestionPipeline};
pub use retriever::{HybridRetriever, RetrieverOptions, DEFAULT_TOP_K};
