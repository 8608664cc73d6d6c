//! Semantic retrieval.
//!
//! The [`Retriever`] embeds a query, asks the vector index for the nearest
//! abstracts and hydrates every hit into a [`RetrievedPaper`], preferring the
//! full record from the paper store and falling back to the metadata stored
//! in the index when the lookup fails.
//!
//! # Usage
//!
//! ```rust,ignore
//! let retriever = Retriever::new(embedding, index, store);
//! let query = SearchQuery::new("graph neural networks", Some(5), None);
//! for hit in retriever.search(&query).await? {
//!     println!("{} - similarity {:.3}", hit.paper.title, hit.similarity);
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{Paper, RetrievedPaper};
use crate::storage::PaperStore;
use crate::vector::{IndexError, Metadata, MetadataFilter, VectorIndex};

/// Separator used for author lists inside index metadata. Author names never
/// contain it (see [`crate::provider::lightweight::sanitize_author`]).
pub const AUTHOR_SEPARATOR: &str = "; ";

/// Errors that can occur during retrieval.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index query failed
    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query text (embedded as-is)
    pub query: String,

    /// Maximum number of results to return
    pub top_k: usize,

    /// Optional metadata predicate
    pub filter: Option<MetadataFilter>,
}

impl SearchQuery {
    /// Create a new search query; `top_k` defaults to 10.
    pub fn new(query: impl Into<String>, top_k: Option<usize>, filter: Option<MetadataFilter>) -> Self {
        Self {
            query: query.into(),
            top_k: top_k.unwrap_or(10),
            filter,
        }
    }
}

/// Embedding + vector index + paper store retrieval.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn PaperStore>,
}

impl Retriever {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn PaperStore>,
    ) -> Self {
        Self {
            embedding_provider,
            index,
            store,
        }
    }

    /// Execute a search and return hits in ascending distance order.
    pub async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<RetrievedPaper>> {
        if query.query.trim().is_empty() {
            return Err(QueryError::InvalidQuery("query text cannot be empty".to_string()));
        }

        let query_embedding = self.embedding_provider.embed(&query.query).await?;
        let hits = self
            .index
            .query(&query_embedding, query.top_k, query.filter.as_ref())
            .await?;
        debug!(query = %query.query, hits = hits.len(), "vector search finished");

        let mut results = Vec::with_capacity(hits.len());
        for (((id, distance), document), metadata) in hits
            .ids
            .into_iter()
            .zip(hits.distances)
            .zip(hits.documents)
            .zip(hits.metadatas)
        {
            let paper = match self.store.get_paper(&id).await {
                Ok(paper) => paper,
                Err(e) => {
                    warn!(uid = %id, error = %e, "paper store lookup failed, using index metadata");
                    paper_from_index(&id, &document, &metadata)
                }
            };
            results.push(RetrievedPaper::new(paper, distance));
        }

        Ok(results)
    }
}

/// Metadata written to the vector index for a paper.
pub fn paper_metadata(paper: &Paper) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), paper.title.clone());
    metadata.insert("authors".to_string(), paper.authors.join(AUTHOR_SEPARATOR));
    metadata.insert("year".to_string(), paper.year.to_string());
    metadata.insert("conference".to_string(), paper.conference.clone());

    let optional = [
        ("session", &paper.session),
        ("decision", &paper.decision),
        ("topic", &paper.topic),
        ("award", &paper.award),
        ("url", &paper.url),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value.clone());
        }
    }
    if !paper.keywords.is_empty() {
        metadata.insert("keywords".to_string(), paper.keywords.join(", "));
    }
    metadata
}

/// Rebuild a paper from a vector-index hit when the store has no record.
pub fn paper_from_index(id: &str, document: &str, metadata: &Metadata) -> Paper {
    let text = |key: &str| metadata.get(key).filter(|v| !v.trim().is_empty()).cloned();
    let split = |key: &str, separator: char| -> Vec<String> {
        metadata
            .get(key)
            .map(|v| {
                v.split(separator)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };

    Paper {
        uid: id.to_string(),
        title: text("title").unwrap_or_else(|| "Untitled".to_string()),
        abstract_text: document.to_string(),
        authors: split("authors", ';'),
        session: text("session"),
        decision: text("decision"),
        topic: text("topic"),
        keywords: split("keywords", ','),
        award: text("award"),
        url: text("url"),
        year: metadata
            .get("year")
            .and_then(|y| y.trim().parse().ok())
            .unwrap_or_default(),
        conference: text("conference").unwrap_or_default(),
    }
}
