//! Search binary entry point.
//!
//! Command-line search over the ingested papers: semantic search through the
//! vector index, or keyword search over titles and abstracts in the paper
//! database. Supports single-query and interactive REPL modes with table or
//! JSON output.
//!
//! # Examples
//!
//! Semantic search:
//! ```bash
//! search --query "graph neural networks" --top-k 5
//! ```
//!
//! JSON output restricted to one conference and year:
//! ```bash
//! search --query "diffusion" --conference NeurIPS --year 2025 --format json
//! ```
//!
//! Keyword search:
//! ```bash
//! search --keyword "transformer"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_rag::{
    config::Config,
    embedding,
    models::{RelevanceLevel, RetrievedPaper},
    query::{Retriever, SearchQuery},
    storage::{sqlite::SqlitePaperStore, PaperFilter, PaperStore},
    vector::{sqlite::SqliteVectorIndex, MetadataFilter, VectorIndex},
    Paper,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search binary CLI for querying the paper databases
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search ingested papers by semantic similarity or keyword",
    long_about = "Query the paper databases using semantic search over abstract embeddings, \
                  or plain keyword search over titles and abstracts.

EXAMPLES:
  Single query:
    search --query \"graph neural networks\"

  JSON output for one conference:
    search --query \"diffusion\" --conference NeurIPS --year 2025 --format json

  Chroma-style metadata filter:
    search --query \"robustness\" --filter '{\"decision\": {\"$in\": [\"Accept (oral)\"]}}'

  Keyword search:
    search --keyword transformer

  Interactive mode:
    search --interactive"
)]
struct Args {
    /// Semantic search query
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["interactive", "keyword"])]
    query: Option<String>,

    /// Keyword matched against titles and abstracts
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    keyword: Option<String>,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value = "10")]
    top_k: usize,

    /// Only papers from this year
    #[arg(long, value_name = "YEAR")]
    year: Option<i32>,

    /// Only papers from this conference
    #[arg(long, value_name = "NAME")]
    conference: Option<String>,

    /// Additional metadata filter as Chroma-style JSON (semantic search only)
    #[arg(long, value_name = "JSON")]
    filter: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Paper database path (overrides PAPER_DB_PATH)
    #[arg(long, value_name = "PATH")]
    paper_db: Option<PathBuf>,

    /// Embedding database path (overrides EMBEDDING_DB_PATH)
    #[arg(long, value_name = "PATH")]
    embedding_db: Option<PathBuf>,

    /// Vector collection name (overrides COLLECTION_NAME)
    #[arg(long, value_name = "NAME")]
    collection: Option<String>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Filters shared by single-query and interactive mode
#[derive(Debug, Clone, Default)]
struct Filters {
    year: Option<i32>,
    conference: Option<String>,
    extra: Option<MetadataFilter>,
}

impl Filters {
    /// Combine every set filter into one metadata predicate
    fn metadata_filter(&self) -> Option<MetadataFilter> {
        let mut clauses = Vec::new();
        if let Some(year) = self.year {
            clauses.push(MetadataFilter::eq("year", year.to_string()));
        }
        if let Some(conference) = &self.conference {
            clauses.push(MetadataFilter::eq("conference", conference.clone()));
        }
        if let Some(extra) = &self.extra {
            clauses.push(extra.clone());
        }
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(MetadataFilter::And(clauses)),
        }
    }

    fn paper_filter(&self, keyword: &str, limit: usize) -> PaperFilter {
        PaperFilter {
            keyword: Some(keyword.to_string()),
            session: None,
            conference: self.conference.clone(),
            year: self.year,
            limit,
        }
    }
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

fn parse_filter(raw: &str) -> Result<MetadataFilter> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("Filter is not valid JSON: {}", raw))?;
    MetadataFilter::from_json(&value).with_context(|| format!("Unsupported filter: {}", raw))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Format semantic results as a pretty table
fn format_results_table(results: &[RetrievedPaper]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Venue").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Similarity").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let (relevance_str, color) = match result.relevance() {
            RelevanceLevel::Identical => ("IDENTICAL", Color::Green),
            RelevanceLevel::HighlySimilar => ("HIGHLY_SIMILAR", Color::Cyan),
            RelevanceLevel::Similar => ("SIMILAR", Color::Yellow),
            RelevanceLevel::Relevant => ("RELEVANT", Color::White),
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&result.paper.title, 60)),
            Cell::new(truncate(&result.paper.authors_display(), 40)),
            Cell::new(format!("{} {}", result.paper.conference, result.paper.year)),
            Cell::new(relevance_str).fg(color),
            Cell::new(format!("{:.4}", result.similarity)),
        ]);
    }

    table.to_string()
}

/// Format keyword results as a pretty table
fn format_papers_table(papers: &[Paper]) -> String {
    if papers.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Venue").add_attribute(Attribute::Bold),
        Cell::new("Decision").add_attribute(Attribute::Bold),
    ]);

    for (idx, paper) in papers.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&paper.title, 60)),
            Cell::new(truncate(&paper.authors_display(), 40)),
            Cell::new(format!("{} {}", paper.conference, paper.year)),
            Cell::new(paper.decision.as_deref().unwrap_or("-")),
        ]);
    }

    table.to_string()
}

/// Display detailed view of a single result
fn display_result_detail(result: &RetrievedPaper, rank: usize) {
    let paper = &result.paper;
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", paper.title);
    println!("Authors: {}", paper.authors_display());
    println!("Venue: {} {}", paper.conference, paper.year);
    if let Some(session) = &paper.session {
        println!("Session: {}", session);
    }
    if let Some(decision) = &paper.decision {
        println!("Decision: {}", decision);
    }
    if let Some(award) = &paper.award {
        println!("Award: {}", award);
    }
    if let Some(url) = &paper.url {
        println!("URL: {}", url);
    }
    println!("Relevance: {:?}", result.relevance());
    println!("Similarity: {:.4} (distance {:.4})", result.similarity, result.distance);
    println!("\nAbstract:\n{}", paper.abstract_text);
    println!("{}", "═".repeat(80));
}

fn print_results(results: &[RetrievedPaper], format: OutputFormat, elapsed: std::time::Duration) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(results));
            println!(
                "\nFound {} results in {:.2}s",
                results.len(),
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(results)
                .context("Failed to serialize results to JSON")?;
            println!("{}", json);
        }
    }
    Ok(())
}

async fn run_keyword_search(
    store: &dyn PaperStore,
    keyword: &str,
    top_k: usize,
    filters: &Filters,
    format: OutputFormat,
) -> Result<()> {
    let papers = store
        .search_papers(&filters.paper_filter(keyword, top_k))
        .await
        .with_context(|| format!("Keyword search failed for '{}'", keyword))?;

    match format {
        OutputFormat::Table => println!("{}", format_papers_table(&papers)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&papers).context("Failed to serialize results to JSON")?
        ),
    }
    Ok(())
}

async fn execute_search(
    retriever: &Retriever,
    query_text: &str,
    top_k: usize,
    filters: &Filters,
) -> Result<Vec<RetrievedPaper>> {
    debug!("Executing search for query: {}", query_text);
    let query = SearchQuery::new(query_text, Some(top_k), filters.metadata_filter());
    retriever
        .search(&query)
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query_text))
}

fn print_help() {
    println!("Commands:");
    println!("  <query>            - Search for papers");
    println!("  /top N             - Set number of results to N");
    println!("  /year YEAR|clear   - Filter by year");
    println!("  /conference NAME|clear - Filter by conference");
    println!("  /filter JSON|clear - Set an additional metadata filter");
    println!("  /format table|json - Choose output format");
    println!("  /detail N          - Show full details for result rank N");
    println!("  /help              - Show this help");
    println!("  Ctrl+D or Ctrl+C   - Exit");
}

/// Run interactive REPL mode
async fn run_interactive(
    retriever: Retriever,
    mut top_k: usize,
    mut filters: Filters,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Paper Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;
    let mut last_results: Vec<RetrievedPaper> = Vec::new();

    loop {
        match rl.readline("Search> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if let Some(command) = line.strip_prefix('/') {
                    let (name, rest) = command
                        .split_once(char::is_whitespace)
                        .map(|(n, r)| (n, r.trim()))
                        .unwrap_or((command, ""));
                    match name {
                        "help" => print_help(),
                        "top" => match rest.parse::<usize>() {
                            Ok(n) if n > 0 => {
                                top_k = n;
                                println!("Set top-k to {}", top_k);
                            }
                            _ => eprintln!("Usage: /top N (positive integer)"),
                        },
                        "year" => match rest {
                            "clear" => {
                                filters.year = None;
                                println!("Cleared year filter");
                            }
                            _ => match rest.parse::<i32>() {
                                Ok(year) => {
                                    filters.year = Some(year);
                                    println!("Set year filter: {}", year);
                                }
                                Err(_) => eprintln!("Usage: /year YEAR  or  /year clear"),
                            },
                        },
                        "conference" => match rest {
                            "" => eprintln!("Usage: /conference NAME  or  /conference clear"),
                            "clear" => {
                                filters.conference = None;
                                println!("Cleared conference filter");
                            }
                            name => {
                                filters.conference = Some(name.to_string());
                                println!("Set conference filter: {}", name);
                            }
                        },
                        "filter" => match rest {
                            "clear" => {
                                filters.extra = None;
                                println!("Cleared metadata filter");
                            }
                            raw => match parse_filter(raw) {
                                Ok(filter) => {
                                    println!("Set metadata filter: {:?}", filter);
                                    filters.extra = Some(filter);
                                }
                                Err(e) => eprintln!("{:#}", e),
                            },
                        },
                        "format" => match rest {
                            "table" => {
                                format = OutputFormat::Table;
                                println!("Set output format to table");
                            }
                            "json" => {
                                format = OutputFormat::Json;
                                println!("Set output format to JSON");
                            }
                            _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                        },
                        "detail" => match rest.parse::<usize>() {
                            Ok(rank) if rank > 0 && rank <= last_results.len() => {
                                display_result_detail(&last_results[rank - 1], rank);
                            }
                            Ok(rank) if rank > last_results.len() => {
                                eprintln!(
                                    "Rank {} out of range (last search had {} results)",
                                    rank,
                                    last_results.len()
                                );
                            }
                            _ => eprintln!("Invalid rank: must be a positive integer"),
                        },
                        _ => eprintln!("Unknown command: /{}. Type /help for available commands.", name),
                    }
                } else {
                    let start = Instant::now();
                    match execute_search(&retriever, line, top_k, &filters).await {
                        Ok(results) => {
                            if let Err(e) = print_results(&results, format, start.elapsed()) {
                                eprintln!("{:#}", e);
                            }
                            last_results = results;
                        }
                        Err(e) => eprintln!("Search failed: {:#}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    if !args.interactive && args.query.is_none() && args.keyword.is_none() {
        anyhow::bail!(
            "One of --query, --keyword or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let mut config = Config::from_env().context("Invalid configuration in environment")?;
    if let Some(path) = args.paper_db {
        config.paper_db_path = path;
    }
    if let Some(path) = args.embedding_db {
        config.embedding_db_path = path;
    }
    if let Some(collection) = args.collection {
        config.collection_name = collection;
    }

    if !config.paper_db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run the ingestion binary first to create the database.",
            config.paper_db_path.display()
        );
    }

    info!("Loading papers from: {}", config.paper_db_path.display());
    let store = Arc::new(
        SqlitePaperStore::open(&config.paper_db_path).context("Failed to open paper database")?,
    );

    let filters = Filters {
        year: args.year,
        conference: args.conference,
        extra: args.filter.as_deref().map(parse_filter).transpose()?,
    };

    if let Some(keyword) = &args.keyword {
        return run_keyword_search(store.as_ref(), keyword, args.top_k, &filters, args.format).await;
    }

    let index = Arc::new(
        SqliteVectorIndex::open(&config.embedding_db_path, &config.collection_name)
            .context("Failed to open embedding database")?,
    );
    let indexed = index.count().await.context("Failed to count indexed papers")?;
    if indexed == 0 {
        anyhow::bail!(
            "Collection '{}' has no embeddings.\n\
             Please run the ingestion binary to embed papers first.",
            config.collection_name
        );
    }

    if let Some(recorded) = index.embedding_config().await? {
        if recorded.model_name != config.embedding_model {
            anyhow::bail!(
                "Collection was embedded with '{}' but EMBEDDING_MODEL is '{}'",
                recorded.model_name,
                config.embedding_model
            );
        }
        info!(
            "Using embedding model: {} (dimension: {})",
            recorded.model_name, recorded.dimension
        );
    }
    info!("Collection contains {} embedded papers", indexed);

    let embedding = embedding::from_config(&config).context("Failed to create embedding provider")?;
    let retriever = Retriever::new(embedding, index, store);

    if args.interactive {
        run_interactive(retriever, args.top_k, filters, args.format).await
    } else if let Some(query) = &args.query {
        let start = Instant::now();
        let results = execute_search(&retriever, query, args.top_k, &filters).await?;
        print_results(&results, args.format, start.elapsed())
    } else {
        Ok(())
    }
}
