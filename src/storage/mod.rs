//! Paper store abstraction and implementations.
//!
//! This module defines the interface for persisting and retrieving paper
//! metadata. The RAG session only needs lookups by uid; ingestion and the
//! command-line tools use the remaining operations.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A paper with the same uid already exists
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Criteria for [`PaperStore::search_papers`].
///
/// Every set field narrows the result; an empty filter lists papers.
#[derive(Debug, Clone)]
pub struct PaperFilter {
    /// Case-insensitive substring matched against title and abstract
    pub keyword: Option<String>,

    pub session: Option<String>,

    pub conference: Option<String>,

    pub year: Option<i32>,

    /// Maximum number of papers to return
    pub limit: usize,
}

impl Default for PaperFilter {
    fn default() -> Self {
        Self {
            keyword: None,
            session: None,
            conference: None,
            year: None,
            limit: 100,
        }
    }
}

impl PaperFilter {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Self::default()
        }
    }
}

/// Trait for paper storage backends.
///
/// Implementations use interior mutability so a single store can be shared
/// behind an `Arc` by ingestion and chat sessions alike.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Create tables and indexes. Idempotent.
    async fn initialize(&self) -> StorageResult<()>;

    /// Insert a paper with its ordered author list.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if the uid is already stored
    async fn insert_paper(&self, paper: &Paper) -> StorageResult<()>;

    /// Check whether a paper with `uid` exists.
    async fn exists(&self, uid: &str) -> StorageResult<bool>;

    /// Get a paper by uid.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the paper doesn't exist
    async fn get_paper(&self, uid: &str) -> StorageResult<Paper>;

    /// Author names of a paper in byline order.
    async fn get_authors(&self, uid: &str) -> StorageResult<Vec<String>>;

    /// Papers matching a filter, ordered by year (newest first) then title.
    async fn search_papers(&self, filter: &PaperFilter) -> StorageResult<Vec<Paper>>;

    /// Author names containing `name` (case-insensitive).
    async fn search_authors(&self, name: &str, limit: usize) -> StorageResult<Vec<String>>;

    /// Every stored uid.
    async fn list_uids(&self) -> StorageResult<Vec<String>>;

    /// Total number of stored papers.
    async fn count_papers(&self) -> StorageResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults() {
        let filter = PaperFilter::default();
        assert_eq!(filter.limit, 100);
        assert!(filter.keyword.is_none());

        let filter = PaperFilter::keyword("diffusion");
        assert_eq!(filter.keyword.as_deref(), Some("diffusion"));
        assert_eq!(filter.limit, 100);
    }
}
