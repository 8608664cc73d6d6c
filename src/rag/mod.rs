//! Retrieval-augmented chat over the paper corpus.
//!
//! A [`RagSession`] turns one user message into one assistant response. For
//! each question it may rewrite the question into a retrieval query, decides
//! whether the cached papers still cover the topic, retrieves fresh papers
//! when they do not, and generates an answer grounded in the retrieved
//! abstracts while keeping a bounded window of conversation history.
//!
//! # Retrieval caching
//!
//! The candidate query is compared with the last query that hit the vector
//! index using Jaccard similarity over content words (see
//! [`similarity::query_similarity`]). At or above the configured threshold the
//! cached papers are reused; below it the index is queried again. Changing
//! `n_results` or the filter on a follow-up does not by itself force a
//! refresh.
//!
//! # Example
//!
//! ```ignore
//! let mut session = RagSession::builder()
//!     .config(&config)
//!     .embedding(embedding)
//!     .index(index)
//!     .store(store)
//!     .chat(chat)
//!     .build()?;
//!
//! let answer = session.query("What are GNN approaches?", QueryOptions::default()).await?;
//! println!("{}", answer.response);
//! ```

pub mod prompt;
pub mod rewrite;
pub mod similarity;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::chat::{ChatClient, ChatError};
use crate::config::Config;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{ChatMessage, RetrievedPaper};
use crate::query::{QueryError, Retriever, SearchQuery};
use crate::storage::PaperStore;
use crate::vector::{IndexError, MetadataFilter, VectorIndex};

pub use prompt::{
    build_context, CONVERSATION_SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT, NO_PAPERS_RESPONSE,
};
pub use rewrite::{try_rewrite, RewriteOutcome};

/// Errors reported by a RAG session.
///
/// Query rewriting and paper store lookups never produce these; they degrade
/// silently.
#[derive(Debug, Error)]
pub enum RagError {
    /// A collaborator is missing or a setting is out of range
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The question cannot be embedded
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("Chat completion error: {0}")]
    Chat(#[from] ChatError),

    /// Writing the conversation export failed
    #[error("Export error: {0}")]
    Export(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QueryError> for RagError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Embedding(e) => RagError::Embedding(e),
            QueryError::Index(e) => RagError::Index(e),
            QueryError::InvalidQuery(msg) => RagError::InvalidQuestion(msg),
        }
    }
}

/// Result type for session operations.
pub type RagResult<T> = Result<T, RagError>;

/// Per-call options for [`RagSession::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Papers to retrieve; the session default when `None`
    pub n_results: Option<usize>,

    /// Metadata predicate applied to fresh retrievals
    pub filter: Option<MetadataFilter>,

    /// Replaces the session's system prompt for this call
    pub system_prompt: Option<String>,
}

impl QueryOptions {
    pub fn with_n_results(mut self, n: usize) -> Self {
        self.n_results = Some(n);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Metadata describing how a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub n_papers: usize,

    /// Chat model that generated the response
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,

    /// Whether the vector index was queried for this response
    pub retrieved_new_papers: bool,
}

/// Answer returned by [`RagSession::query`] and [`RagSession::chat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub response: String,
    pub papers: Vec<RetrievedPaper>,
    pub metadata: ResponseMetadata,
}

/// Whether a session has any history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    Active,
}

/// Generation and retrieval settings of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_context_papers: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub enable_query_rewriting: bool,
    pub similarity_threshold: f32,

    /// Replaces the built-in system prompts for every call
    pub system_prompt: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_context_papers: config.max_context_papers,
            temperature: config.chat_temperature,
            max_tokens: config.chat_max_tokens,
            enable_query_rewriting: config.enable_query_rewriting,
            similarity_threshold: config.query_similarity_threshold,
            system_prompt: None,
        }
    }
}

/// Builder for [`RagSession`].
#[derive(Default)]
pub struct RagSessionBuilder {
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    store: Option<Arc<dyn PaperStore>>,
    chat: Option<Arc<dyn ChatClient>>,
    settings: SessionSettings,
}

impl RagSessionBuilder {
    /// Take generation and retrieval settings from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.settings = SessionSettings::from(config);
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn embedding(mut self, embedding: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn store(mut self, store: Arc<dyn PaperStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn enable_query_rewriting(mut self, enabled: bool) -> Self {
        self.settings.enable_query_rewriting = enabled;
        self
    }

    pub fn max_context_papers(mut self, n: usize) -> Self {
        self.settings.max_context_papers = n;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.settings.similarity_threshold = threshold;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = Some(prompt.into());
        self
    }

    /// # Errors
    /// Returns `RagError::Configuration` when a collaborator is missing or
    /// the settings are out of range
    pub fn build(self) -> RagResult<RagSession> {
        let missing = |name: &str| RagError::Configuration(format!("{} is required", name));
        let embedding = self.embedding.ok_or_else(|| missing("embedding provider"))?;
        let index = self.index.ok_or_else(|| missing("vector index"))?;
        let store = self.store.ok_or_else(|| missing("paper store"))?;
        let chat = self.chat.ok_or_else(|| missing("chat client"))?;

        if self.settings.max_context_papers == 0 {
            return Err(RagError::Configuration(
                "max_context_papers must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.settings.similarity_threshold) {
            return Err(RagError::Configuration(format!(
                "similarity threshold {} is outside [0, 1]",
                self.settings.similarity_threshold
            )));
        }

        Ok(RagSession {
            retriever: Retriever::new(embedding, index, store),
            chat,
            settings: self.settings,
            history: Vec::new(),
            last_search_query: None,
            cached_papers: Vec::new(),
            cached_context: String::new(),
        })
    }
}

/// One conversation with retrieval caching.
///
/// Not meant for concurrent use; create one session per conversation.
pub struct RagSession {
    retriever: Retriever,
    chat: Arc<dyn ChatClient>,
    settings: SessionSettings,
    history: Vec<ChatMessage>,
    last_search_query: Option<String>,
    cached_papers: Vec<RetrievedPaper>,
    cached_context: String,
}

impl RagSession {
    pub fn builder() -> RagSessionBuilder {
        RagSessionBuilder::default()
    }

    /// Answer `question` from retrieved papers.
    ///
    /// On success exactly two turns are appended to the history: the literal
    /// question and the response. On error the history is untouched.
    pub async fn query(&mut self, question: &str, options: QueryOptions) -> RagResult<RagResponse> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidQuestion("question cannot be empty".to_string()));
        }

        let outcome = if self.settings.enable_query_rewriting {
            try_rewrite(self.chat.as_ref(), question, &self.history).await
        } else {
            RewriteOutcome::Unchanged
        };
        let candidate = outcome.query_or(question);
        let rewritten_query = match &outcome {
            RewriteOutcome::Rewritten(query) => Some(query.clone()),
            RewriteOutcome::Unchanged => None,
        };

        let retrieved_new_papers = self.should_retrieve_papers(candidate);
        if retrieved_new_papers {
            let n_results = options.n_results.unwrap_or(self.settings.max_context_papers);
            let search = SearchQuery::new(candidate, Some(n_results), options.filter.clone());
            let papers = self.retriever.search(&search).await?;

            if papers.is_empty() {
                info!(query = %candidate, "no papers found");
                self.clear_cache();
                self.push_turn(question, NO_PAPERS_RESPONSE);
                return Ok(RagResponse {
                    response: NO_PAPERS_RESPONSE.to_string(),
                    papers: Vec::new(),
                    metadata: ResponseMetadata {
                        n_papers: 0,
                        model: self.chat.model_name().to_string(),
                        rewritten_query,
                        retrieved_new_papers,
                    },
                });
            }

            info!(query = %candidate, papers = papers.len(), "retrieved papers");
            self.cached_context = build_context(&papers);
            self.cached_papers = papers;
            self.last_search_query = Some(candidate.to_string());
        } else {
            info!(query = %candidate, papers = self.cached_papers.len(), "reusing cached papers");
        }

        let system_prompt = options
            .system_prompt
            .as_deref()
            .or(self.settings.system_prompt.as_deref())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let messages =
            prompt::build_messages(system_prompt, &self.history, &self.cached_context, question);
        let response = self
            .chat
            .complete(&messages, self.settings.temperature, self.settings.max_tokens)
            .await?;

        self.push_turn(question, &response);
        Ok(RagResponse {
            response,
            papers: self.cached_papers.clone(),
            metadata: ResponseMetadata {
                n_papers: self.cached_papers.len(),
                model: self.chat.model_name().to_string(),
                rewritten_query,
                retrieved_new_papers,
            },
        })
    }

    /// Answer `message`, with retrieval when `use_context` is set.
    ///
    /// Without context no rewrite or retrieval happens and the cache is left
    /// alone, but the exchange is still recorded in the history. The session's
    /// system prompt applies, else [`CONVERSATION_SYSTEM_PROMPT`].
    pub async fn chat(
        &mut self,
        message: &str,
        use_context: bool,
        n_results: Option<usize>,
    ) -> RagResult<RagResponse> {
        if use_context {
            let options = QueryOptions {
                n_results,
                ..QueryOptions::default()
            };
            return self.query(message, options).await;
        }

        let system_prompt = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(CONVERSATION_SYSTEM_PROMPT);
        let messages = prompt::build_messages(system_prompt, &self.history, "", message);
        let response = self
            .chat
            .complete(&messages, self.settings.temperature, self.settings.max_tokens)
            .await?;

        self.push_turn(message, &response);
        Ok(RagResponse {
            response,
            papers: Vec::new(),
            metadata: ResponseMetadata {
                n_papers: 0,
                model: self.chat.model_name().to_string(),
                rewritten_query: None,
                retrieved_new_papers: false,
            },
        })
    }

    /// Whether `candidate` has drifted far enough from the last retrieval
    /// query to need fresh papers.
    pub fn should_retrieve_papers(&self, candidate: &str) -> bool {
        match &self.last_search_query {
            None => true,
            Some(previous) => {
                let score = similarity::query_similarity(candidate, previous);
                debug!(candidate, previous = %previous, score, "query similarity");
                score < self.settings.similarity_threshold
            }
        }
    }

    /// Forget the conversation and the retrieval cache.
    pub fn reset_conversation(&mut self) {
        self.history.clear();
        self.clear_cache();
    }

    /// Write the history to `path` as a JSON array of `{role, content}`,
    /// replacing any existing file.
    pub fn export_conversation(&self, path: impl AsRef<Path>) -> RagResult<()> {
        let json = serde_json::to_string_pretty(&self.history)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), turns = self.history.len(), "exported conversation");
        Ok(())
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn last_search_query(&self) -> Option<&str> {
        self.last_search_query.as_deref()
    }

    pub fn cached_papers(&self) -> &[RetrievedPaper] {
        &self.cached_papers
    }

    pub fn cached_context(&self) -> &str {
        &self.cached_context
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        if self.history.is_empty() {
            SessionState::Fresh
        } else {
            SessionState::Active
        }
    }

    fn clear_cache(&mut self) {
        self.last_search_query = None;
        self.cached_papers.clear();
        self.cached_context.clear();
    }

    fn push_turn(&mut self, question: &str, response: &str) {
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(response));
    }
}
