//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and provides
//! an OpenAI-compatible HTTP client plus an optional in-process fastembed
//! backend. Ingestion and retrieval only see the [`EmbeddingProvider`] trait.

#[cfg(feature = "local-embeddings")]
pub mod fastembed;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, EmbeddingBackend};

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The backend did not answer in time
    #[error("Embedding request timed out")]
    Timeout,

    /// The backend answered with something we could not use
    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    /// Invalid input text (e.g. empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g. backend not compiled in)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// # Example Usage
/// ```ignore
/// let provider = OpenAIEmbedding::new(&config)?;
/// let embedding = provider.embed("graph neural networks").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError::InvalidInput` for empty or whitespace-only
    /// text, and other variants when the backend fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Model identifier, recorded next to the vectors it produced.
    fn model_name(&self) -> &str;

    /// Dimension of produced vectors when known without a request.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Build the provider selected by the configuration.
pub fn from_config(config: &Config) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    match config.embedding_backend {
        EmbeddingBackend::Http => Ok(Arc::new(openai::OpenAIEmbedding::from_config(config)?)),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(fastembed::FastEmbedProvider::new(
            &config.embedding_model,
            None,
        )?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(EmbeddingError::ConfigError(
            "local embeddings require the `local-embeddings` feature".to_string(),
        )),
    }
}

/// Reject empty or whitespace-only input before it reaches a backend.
pub(crate) fn ensure_non_empty(text: &str) -> EmbeddingResult<()> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
    }
    Ok(())
}

/// Normalizes text for comparisons and stable identifiers.
///
/// Lowercases, trims and collapses runs of whitespace.
///
/// # Example
/// ```ignore
/// let normalized = normalize_text("  Hello   World  ");
/// assert_eq!(normalized, "hello world");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text("Line\nBreak\tTab"), "line break tab");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_ensure_non_empty() {
        assert!(ensure_non_empty("text").is_ok());
        assert!(matches!(
            ensure_non_empty(" \n\t"),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_local_backend_requires_feature() {
        let config = Config {
            embedding_backend: EmbeddingBackend::Local,
            ..Config::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(EmbeddingError::ConfigError(_))
        ));
    }

    #[test]
    fn test_http_backend_from_config() {
        let config = Config {
            embedding_model: "nomic-embed".to_string(),
            ..Config::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.model_name(), "nomic-embed");
    }
}
