//! Chat binary entry point.
//!
//! Answers questions about the ingested papers with retrieval-augmented
//! generation, either once from the command line or in an interactive REPL
//! that keeps the conversation going.
//!
//! # Examples
//!
//! One question:
//! ```bash
//! chat --question "What are recent approaches to graph neural networks?"
//! ```
//!
//! Interactive session restricted to one conference:
//! ```bash
//! chat --conference NeurIPS
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paper_rag::{
    chat::openai::OpenAIChat,
    config::Config,
    embedding,
    rag::{QueryOptions, RagResponse, RagSession},
    storage::sqlite::SqlitePaperStore,
    vector::{sqlite::SqliteVectorIndex, MetadataFilter, VectorIndex},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Chat CLI for asking questions about the paper corpus
#[derive(Parser, Debug)]
#[command(
    name = "chat",
    version,
    about = "Ask questions about conference papers",
    long_about = "Retrieval-augmented chat over the ingested papers. Backend settings \
                  (LLM_BACKEND_URL, CHAT_MODEL, EMBEDDING_MODEL, ...) are read from the environment.

EXAMPLES:
  One question:
    chat --question \"What are recent approaches to graph neural networks?\"

  Interactive session without query rewriting:
    chat --no-rewrite

  Only NeurIPS 2025 papers, export the transcript on exit:
    chat --conference NeurIPS --year 2025 --export conversation.json"
)]
struct Args {
    /// Ask one question and exit
    #[arg(short, long, value_name = "TEXT")]
    question: Option<String>,

    /// Papers retrieved per question (overrides MAX_CONTEXT_PAPERS)
    #[arg(short = 'n', long, value_name = "N")]
    n_results: Option<usize>,

    /// Only retrieve papers from this year
    #[arg(long, value_name = "YEAR")]
    year: Option<i32>,

    /// Only retrieve papers from this conference
    #[arg(long, value_name = "NAME")]
    conference: Option<String>,

    /// Disable query rewriting (overrides ENABLE_QUERY_REWRITING)
    #[arg(long)]
    no_rewrite: bool,

    /// Replace the default system prompt
    #[arg(long, value_name = "TEXT")]
    system_prompt: Option<String>,

    /// Write the conversation to this file when the session ends
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

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

/// Settings the REPL can change between questions
struct ChatState {
    use_context: bool,
    n_results: Option<usize>,
    filter: Option<MetadataFilter>,
}

impl ChatState {
    fn options(&self) -> QueryOptions {
        QueryOptions {
            n_results: self.n_results,
            filter: self.filter.clone(),
            system_prompt: None,
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

fn build_filter(year: Option<i32>, conference: Option<String>) -> Option<MetadataFilter> {
    let mut clauses = Vec::new();
    if let Some(year) = year {
        clauses.push(MetadataFilter::eq("year", year.to_string()));
    }
    if let Some(conference) = conference {
        clauses.push(MetadataFilter::eq("conference", conference));
    }
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(MetadataFilter::And(clauses)),
    }
}

async fn create_session(config: &Config, system_prompt: Option<String>) -> Result<RagSession> {
    let store = SqlitePaperStore::open(&config.paper_db_path)
        .with_context(|| format!("Failed to open paper database {:?}", config.paper_db_path))?;
    let index = SqliteVectorIndex::open(&config.embedding_db_path, &config.collection_name)
        .with_context(|| {
            format!("Failed to open embedding database {:?}", config.embedding_db_path)
        })?;

    let indexed = index.count().await.context("Failed to count indexed papers")?;
    if indexed == 0 {
        anyhow::bail!(
            "Collection '{}' has no embeddings.\n\
             Please run the ingestion binary to embed papers first.",
            config.collection_name
        );
    }
    info!("Collection '{}' contains {} embedded papers", config.collection_name, indexed);

    let embedding = embedding::from_config(config).context("Failed to create embedding provider")?;
    let chat = OpenAIChat::from_config(config).context("Failed to create chat client")?;

    let mut builder = RagSession::builder().config(config);
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    builder
        .embedding(embedding)
        .index(Arc::new(index))
        .store(Arc::new(store))
        .chat(Arc::new(chat))
        .build()
        .context("Failed to create chat session")
}

fn print_response(response: &RagResponse) {
    println!("\n{}\n", response.response);
    if !response.papers.is_empty() {
        let source = if response.metadata.retrieved_new_papers {
            "retrieved"
        } else {
            "cached"
        };
        println!("Sources ({}):", source);
        for (i, paper) in response.papers.iter().enumerate() {
            println!(
                "  [{}] {} ({} {}, similarity {:.3})",
                i + 1,
                paper.paper.title,
                paper.paper.conference,
                paper.paper.year,
                paper.similarity
            );
        }
    }
    if let Some(rewritten) = &response.metadata.rewritten_query {
        debug!("Search query: {}", rewritten);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <question>       - Ask a question");
    println!("  /reset           - Start a new conversation");
    println!("  /export PATH     - Save the conversation as JSON");
    println!("  /papers          - List the papers currently in context");
    println!("  /context on|off  - Toggle retrieval of papers");
    println!("  /n N             - Set number of papers retrieved per question");
    println!("  /help            - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

async fn ask(session: &mut RagSession, state: &ChatState, question: &str) -> Result<RagResponse> {
    let response = if state.use_context {
        session.query(question, state.options()).await?
    } else {
        session.chat(question, false, None).await?
    };
    Ok(response)
}

/// Run interactive REPL mode
async fn run_interactive(session: &mut RagSession, mut state: ChatState) -> Result<()> {
    println!("Paper Chat");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        match rl.readline("You> ") {
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
                        "reset" => {
                            session.reset_conversation();
                            println!("Conversation cleared");
                        }
                        "export" => {
                            if rest.is_empty() {
                                eprintln!("Usage: /export PATH");
                                continue;
                            }
                            match session.export_conversation(rest) {
                                Ok(()) => println!(
                                    "Exported {} messages to {}",
                                    session.history().len(),
                                    rest
                                ),
                                Err(e) => eprintln!("Export failed: {}", e),
                            }
                        }
                        "papers" => {
                            if session.cached_papers().is_empty() {
                                println!("No papers in context");
                            }
                            for (i, paper) in session.cached_papers().iter().enumerate() {
                                println!(
                                    "  [{}] {} - {}",
                                    i + 1,
                                    paper.paper.title,
                                    paper.paper.authors_display()
                                );
                            }
                        }
                        "context" => match rest {
                            "on" => {
                                state.use_context = true;
                                println!("Paper retrieval enabled");
                            }
                            "off" => {
                                state.use_context = false;
                                println!("Paper retrieval disabled");
                            }
                            _ => eprintln!("Usage: /context on|off"),
                        },
                        "n" => match rest.parse::<usize>() {
                            Ok(n) if n > 0 => {
                                state.n_results = Some(n);
                                println!("Retrieving {} papers per question", n);
                            }
                            _ => eprintln!("Usage: /n N (positive integer)"),
                        },
                        _ => eprintln!("Unknown command: /{}. Type /help for available commands.", name),
                    }
                } else {
                    match ask(session, &state, line).await {
                        Ok(response) => print_response(&response),
                        Err(e) => eprintln!("Error: {:#}", e),
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
    if args.no_rewrite {
        config.enable_query_rewriting = false;
    }
    config.validate().context("Invalid configuration")?;

    let mut session = create_session(&config, args.system_prompt).await?;
    let state = ChatState {
        use_context: true,
        n_results: args.n_results,
        filter: build_filter(args.year, args.conference),
    };

    match &args.question {
        Some(question) => {
            let response = ask(&mut session, &state, question).await?;
            print_response(&response);
        }
        None => run_interactive(&mut session, state).await?,
    }

    if let Some(path) = &args.export {
        session
            .export_conversation(path)
            .with_context(|| format!("Failed to export conversation to {:?}", path))?;
        info!("Conversation exported to {}", path.display());
    }

    Ok(())
}
