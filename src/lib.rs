//! Paper RAG - retrieval-augmented question answering over conference papers.
//!
//! This library ingests paper metadata from conference exports, stores it in
//! SQLite, embeds abstracts into a vector index and answers natural-language
//! questions with an OpenAI-compatible chat backend grounded in the retrieved
//! papers.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, RetrievedPaper, ChatMessage, etc.)
//! - **config**: Configuration loaded from the environment
//! - **provider**: Conference export parsing and schema normalization
//! - **storage**: Paper metadata persistence (SQLite-based)
//! - **vector**: Embedding index with metadata filters (SQLite-based)
//! - **embedding**: Text embedding clients
//! - **chat**: Chat-completion clients
//! - **query**: Semantic retrieval
//! - **ingestion**: Offline ingestion pipeline
//! - **rag**: Conversational sessions with retrieval caching
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load a conference export and normalize every record into a `Paper`
//! 2. Skip papers whose uid is already stored
//! 3. Store new papers and embed their abstracts into the vector index
//!
//! ## Online Chat
//!
//! 1. Optionally rewrite the question into a retrieval query
//! 2. Reuse cached papers if the topic has not changed, else search again
//! 3. Build a context block from the papers and ask the chat backend
//! 4. Record the exchange in the conversation history
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_rag::{
//!     chat::openai::OpenAIChat,
//!     config::Config,
//!     rag::{QueryOptions, RagSession},
//!     storage::sqlite::SqlitePaperStore,
//!     vector::sqlite::SqliteVectorIndex,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let mut session = RagSession::builder()
//!         .config(&config)
//!         .embedding(paper_rag::embedding::from_config(&config)?)
//!         .index(Arc::new(SqliteVectorIndex::open(&config.embedding_db_path, &config.collection_name)?))
//!         .store(Arc::new(SqlitePaperStore::open(&config.paper_db_path)?))
//!         .chat(Arc::new(OpenAIChat::from_config(&config)?))
//!         .build()?;
//!
//!     let answer = session.query("What are GNN approaches?", QueryOptions::default()).await?;
//!     println!("{}", answer.response);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod embedding;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod rag;
pub mod storage;
pub mod vector;

// Re-export commonly used types at the crate root
pub use chat::ChatClient;
pub use config::Config;
pub use embedding::EmbeddingProvider;
pub use models::{ChatMessage, EmbeddingConfig, Paper, RelevanceLevel, RetrievedPaper, Role};
pub use query::{Retriever, SearchQuery};
pub use rag::{QueryOptions, RagResponse, RagSession};
pub use storage::PaperStore;
pub use vector::{MetadataFilter, VectorIndex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
