//! Paper provider module.
//!
//! This module defines the interface for sourcing paper metadata and the
//! normalization layer that converts heterogeneous conference exports into
//! canonical [`Paper`] records.
//!
//! The `PaperProvider` trait abstracts the source of paper data so the
//! ingestion pipeline does not care whether papers come from a NeurIPS
//! virtual-site dump, an OpenReview export or a hand-written file.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod json;
pub mod lightweight;

pub use lightweight::{convert_record, Conference, RecordDefaults};

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing paper metadata.
///
/// Providers return fully normalized papers: records that cannot be turned
/// into a [`Paper`] (no title) are dropped by the provider, not reported.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch all available papers from this provider.
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>>;

    /// Fetch at most `limit` papers.
    async fn fetch_papers_limit(&self, limit: usize) -> ProviderResult<Vec<Paper>> {
        let all_papers = self.fetch_papers().await?;
        Ok(all_papers.into_iter().take(limit).collect())
    }

    /// Number of papers this provider yields.
    async fn count_papers(&self) -> ProviderResult<usize> {
        self.fetch_papers().await.map(|papers| papers.len())
    }

    /// Human-readable name used in logs.
    fn name(&self) -> &str;
}
