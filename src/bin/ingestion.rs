//! Ingestion pipeline binary entry point.
//!
//! Loads a conference export, stores new papers in the paper database and
//! embeds their abstracts into the vector index.
//!
//! # Examples
//!
//! Ingest a NeurIPS export:
//! ```bash
//! ingestion --input neurips_2025.json --conference neurips --year 2025
//! ```
//!
//! Store papers now, embed later:
//! ```bash
//! ingestion --input iclr_2025.json --conference iclr --year 2025 --skip-embeddings
//! ingestion --embed-missing
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_rag::{
    config::Config,
    embedding,
    ingestion::{IngestionPipeline, IngestionStats},
    provider::{json::JsonFilePaperProvider, Conference, PaperProvider, RecordDefaults},
    storage::sqlite::SqlitePaperStore,
    vector::sqlite::SqliteVectorIndex,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ingestion pipeline CLI for building and updating the paper databases
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Load conference papers into the paper and embedding databases",
    long_about = "Ingestion pipeline that normalizes conference exports, stores paper metadata \
                  and embeds abstracts for semantic search.

Backend settings (LLM_BACKEND_URL, EMBEDDING_MODEL, EMBEDDING_BACKEND, ...) are read from the \
environment; the flags below override the database locations.

EXAMPLES:
  Ingest a NeurIPS export:
    ingestion --input neurips_2025.json --conference neurips --year 2025

  Metadata only, embeddings later:
    ingestion --input iclr.json --conference iclr --year 2025 --skip-embeddings
    ingestion --embed-missing"
)]
struct IngestionArgs {
    /// Input JSON file containing paper records
    #[arg(short, long, value_name = "FILE", required_unless_present = "embed_missing")]
    input: Option<PathBuf>,

    /// Conference the records belong to, unless a record says otherwise
    #[arg(long, value_name = "NAME", default_value = "neurips")]
    conference: Conference,

    /// Conference year, unless a record says otherwise
    #[arg(long, value_name = "YEAR", default_value = "2025")]
    year: i32,

    /// Paper database path (overrides PAPER_DB_PATH)
    #[arg(long, value_name = "PATH")]
    paper_db: Option<PathBuf>,

    /// Embedding database path (overrides EMBEDDING_DB_PATH)
    #[arg(long, value_name = "PATH")]
    embedding_db: Option<PathBuf>,

    /// Vector collection name (overrides COLLECTION_NAME)
    #[arg(long, value_name = "NAME")]
    collection: Option<String>,

    /// Number of papers per batch
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Ingest at most this many papers
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Store metadata without embedding abstracts
    #[arg(long)]
    skip_embeddings: bool,

    /// Embed every stored paper that is missing from the index
    #[arg(long, conflicts_with = "skip_embeddings")]
    embed_missing: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Create the parent directory of a database file if needed
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }
    Ok(())
}

/// Apply CLI overrides on top of the environment configuration
fn load_config(args: &IngestionArgs) -> Result<Config> {
    let mut config = Config::from_env().context("Invalid configuration in environment")?;
    if let Some(path) = &args.paper_db {
        config.paper_db_path = path.clone();
    }
    if let Some(path) = &args.embedding_db {
        config.embedding_db_path = path.clone();
    }
    if let Some(collection) = &args.collection {
        config.collection_name = collection.clone();
    }
    Ok(config)
}

/// Open the store and index and wire them into a pipeline
fn create_pipeline(args: &IngestionArgs, config: &Config) -> Result<IngestionPipeline> {
    ensure_parent_dir(&config.paper_db_path)?;
    ensure_parent_dir(&config.embedding_db_path)?;

    let store = SqlitePaperStore::open(&config.paper_db_path)
        .with_context(|| format!("Failed to open paper database {:?}", config.paper_db_path))?;
    let index = SqliteVectorIndex::open(&config.embedding_db_path, &config.collection_name)
        .with_context(|| {
            format!("Failed to open embedding database {:?}", config.embedding_db_path)
        })?;
    let embedding = embedding::from_config(config).context("Failed to create embedding provider")?;

    info!(
        paper_db = %config.paper_db_path.display(),
        embedding_db = %config.embedding_db_path.display(),
        collection = %config.collection_name,
        model = embedding.model_name(),
        "pipeline configured"
    );

    Ok(
        IngestionPipeline::new(embedding, Arc::new(store), Arc::new(index), Some(args.batch_size))
            .with_skip_embeddings(args.skip_embeddings),
    )
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers | Inserted: {msg}")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn print_summary(stats: &IngestionStats, elapsed: std::time::Duration) {
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Embedded:             {:>16} ║", stats.embedded);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");
}

/// Ingest the input file chunk by chunk so progress can be reported
async fn ingest_file(
    pipeline: &IngestionPipeline,
    input: &Path,
    args: &IngestionArgs,
) -> Result<IngestionStats> {
    let defaults = RecordDefaults::new(args.conference.display_name(), args.year);
    let provider = JsonFilePaperProvider::from_file(input, defaults)
        .await
        .with_context(|| format!("Failed to load papers from {:?}", input))?;

    let papers = match args.limit {
        Some(limit) => provider.fetch_papers_limit(limit).await?,
        None => provider.fetch_papers().await?,
    };
    info!("Found {} papers from {}", papers.len(), provider.name());

    let mut total = IngestionStats::new();
    if papers.is_empty() {
        warn!("No papers found in input file");
        return Ok(total);
    }

    let progress = create_progress_bar(papers.len())?;
    progress.set_message("0");
    for chunk in papers.chunks(pipeline.batch_size()) {
        let stats = pipeline
            .ingest_batch(chunk)
            .await
            .context("Failed to ingest papers")?;
        total.absorb(&stats);
        progress.inc(chunk.len() as u64);
        progress.set_message(total.inserted.to_string());
    }
    progress.finish_with_message(total.inserted.to_string());

    Ok(total)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestionArgs::parse();
    init_logging(&args.log_level);

    info!("Starting paper ingestion pipeline");
    debug!("CLI arguments: {:?}", args);
    let start_time = Instant::now();

    let config = load_config(&args)?;
    let pipeline = create_pipeline(&args, &config)?;
    pipeline
        .prepare()
        .await
        .context("Failed to prepare databases for ingestion")?;

    let mut stats = IngestionStats::new();
    if let Some(input) = &args.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {:?}", input);
        }
        stats.absorb(&ingest_file(&pipeline, input, &args).await?);
    }

    if args.embed_missing {
        info!("Embedding stored papers missing from the index");
        let embedded = pipeline
            .embed_missing()
            .await
            .context("Failed to embed missing papers")?;
        stats.absorb(&embedded);
    }

    print_summary(&stats, start_time.elapsed());

    if stats.failed > 0 {
        warn!(
            "{} papers failed to process - check logs for details",
            stats.failed
        );
    }

    info!("Ingestion pipeline completed successfully");
    Ok(())
}
