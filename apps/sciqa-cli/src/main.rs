//! `sciqa`: ingest a chunk corpus, query it, and answer questions with citations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use sciqa_core::config::{Config, Settings, WireShape};
use sciqa_embed::{get_default_encoders, DualEncoder};
use sciqa_hybrid::{HybridRetriever, IngestOptions, IngestionPipeline, RetrieverOptions};
use sciqa_vector::{open_store, VectorStore};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod check;
mod chat;

#[derive(Parser)]
#[command(name = "sciqa")]
#[command(version, about = "Hybrid retrieval and cited answers over a scientific corpus")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding config.toml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode and store every record of a corpus directory
    Ingest {
        #[arg(long)]
        input_dir: PathBuf,
        /// Corpus file index to resume from
        #[arg(long, default_value_t = 0)]
        start_index: usize,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print the fused ranking for a query
    Retrieve {
        query: String,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Retrieve and synthesize a cited answer
    Ask {
        question: String,
        #[arg(long, value_enum)]
        shape: Option<ShapeArg>,
        #[arg(long)]
        k: Option<usize>,
        /// Print the wire JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Run the citation checks over recorded answers
    Check {
        /// JSONL of `{question, documents, answer}` samples
        samples: PathBuf,
        #[arg(long, value_enum)]
        shape: Option<ShapeArg>,
    },
    /// Interactive conversation on stdin
    Chat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShapeArg {
    Urls,
    Objects,
}

impl From<ShapeArg> for WireShape {
    fn from(s: ShapeArg) -> Self {
        match s {
            ShapeArg::Urls => WireShape::Urls,
            ShapeArg::Objects => WireShape::Objects,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn load_settings(dir: &std::path::Path) -> Result<Settings> {
    let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let settings = Config::load_from(dir, &env_name)?.settings()?;
    Ok(settings)
}

pub(crate) struct Services {
    pub settings: Settings,
    pub encoder: Arc<DualEncoder>,
    pub store: Arc<dyn VectorStore>,
}

impl Services {
    pub async fn open(settings: Settings) -> Result<Self> {
        let encoder = Arc::new(get_default_encoders(&settings.encoder).context("loading encoders")?);
        let store = open_store(&settings.store).await.context("opening vector store")?;
        Ok(Self { settings, encoder, store })
    }

    pub fn retriever(&self) -> HybridRetriever {
        HybridRetriever::new(
            Arc::clone(&self.encoder),
            Arc::clone(&self.store),
            self.settings.store.collection.clone(),
            RetrieverOptions { default_k: self.settings.retrieval.top_k, query_timeout: self.settings.store.query_timeout() },
        )
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} chunks stored {msg}") {
        pb.set_style(style);
    }
    pb
}

async fn ingest(
    services: Services,
    input_dir: PathBuf,
    start_index: usize,
    batch_size: Option<usize>,
    collection: Option<String>,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| services.settings.store.collection.clone());
    let batch_size = batch_size.unwrap_or(services.settings.encoder.batch_size).max(1);
    let pb = progress_bar();
    let hook_pb = pb.clone();
    let last_written = AtomicUsize::new(0);
    let pipeline = IngestionPipeline::new(services.encoder, services.store, collection.clone(), IngestOptions { batch_size })
        .on_batch(move |report| {
            // batch counters restart with every corpus file
            let prev = if report.batches == 1 { 0 } else { last_written.load(Ordering::Relaxed) };
            last_written.store(report.written, Ordering::Relaxed);
            hook_pb.inc(report.written.saturating_sub(prev) as u64);
        });

    info!(dir = %input_dir.display(), collection = %collection, start_index, batch_size, "starting ingestion");
    match pipeline.ingest_corpus(&input_dir, start_index).await {
        Ok(report) => {
            pb.finish_with_message("done");
            println!(
                "Ingested {} files: {} records seen, {} written, {} empty skipped. Next --start-index {}",
                report.files, report.records.seen, report.records.written, report.records.skipped_empty, report.next_file
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            let resume = e.file_index.unwrap_or(start_index);
            Err(anyhow::Error::new(e).context(format!("resume with --start-index {resume}")))
        }
    }
}

async fn retrieve(services: Services, query: String, k: Option<usize>) -> Result<()> {
    let retriever = services.retriever();
    let k = k.unwrap_or(retriever.default_k());
    let docs = retriever.retrieve(&query, k).await?;
    if docs.is_empty() {
        println!("No documents matched.");
    }
    for (rank, doc) in docs.iter().enumerate() {
        let preview: String = doc.text.chars().take(160).collect();
        println!("{:>2}. [{:.4}] {} ({})", rank + 1, doc.score, doc.chunk_id, doc.section);
        println!("    {}", doc.url().unwrap_or("N/A"));
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}

async fn ask(services: Services, question: String, shape: Option<ShapeArg>, k: Option<usize>, json: bool) -> Result<()> {
    let mut settings = services.settings.clone();
    if let Some(shape) = shape {
        settings.answer.shape = shape.into();
    }
    let synthesizer = sciqa_answer::Synthesizer::from_settings(&settings)?;
    let retriever = services.retriever();
    let docs = retriever.retrieve(&question, k.unwrap_or(retriever.default_k())).await?;
    let result = synthesizer.synthesize(&question, &docs).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sciqa_answer::render(&result, settings.answer.shape))?);
        return Ok(());
    }
    println!("{}\n", result.answer_markdown);
    for (i, citation) in result.citations.iter().enumerate() {
        println!("[{}] {}", i + 1, citation.url);
    }
    for url in &result.image_urls {
        println!("image: {url}");
    }
    println!("\nconfidence: {}  outcome: {:?}", result.confidence_score, result.outcome);
    for violation in &result.violations {
        println!("warning: {violation:?}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = load_settings(&cli.config_dir)?;

    match cli.command {
        Commands::Ingest { input_dir, start_index, batch_size, collection } => {
            ingest(Services::open(settings).await?, input_dir, start_index, batch_size, collection).await
        }
        Commands::Retrieve { query, k } => retrieve(Services::open(settings).await?, query, k).await,
        Commands::Ask { question, shape, k, json } => ask(Services::open(settings).await?, question, shape, k, json).await,
        Commands::Check { samples, shape } => {
            check::run(&samples, shape.map_or(settings.answer.shape, WireShape::from))
        }
        Commands::Chat => chat::run(Services::open(settings).await?).await,
    }
}
