//! Chat-completion client abstraction.
//!
//! The RAG session generates answers and rewrites queries through the
//! [`ChatClient`] trait. [`openai::OpenAIChat`] implements it against any
//! OpenAI-compatible `/v1/chat/completions` endpoint.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatMessage;

/// Errors returned by chat backends.
///
/// None of these are retried by callers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request did not complete within the configured timeout
    #[error("Chat completion request timed out")]
    Timeout,

    /// The backend answered with a non-2xx status
    #[error("Chat completion failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("Malformed chat completion response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure
    #[error("Chat completion request failed: {0}")]
    Request(String),
}

/// Result type for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Trait for chat-completion backends.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` and return the content of the first choice.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> ChatResult<String>;

    /// Model identifier reported in response metadata.
    fn model_name(&self) -> &str;
}
