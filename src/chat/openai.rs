//! OpenAI-compatible chat-completion client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatClient, ChatError, ChatResult};
use crate::config::Config;
use crate::embedding::openai::endpoint_url;
use crate::models::ChatMessage;

/// HTTP chat client for `POST {base}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAIChat {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAIChat {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint_url(base_url, "chat/completions"),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &Config) -> ChatResult<Self> {
        Self::new(
            &config.llm_backend_url,
            config.chat_model.clone(),
            config.llm_backend_auth_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> ChatResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.model, messages = messages.len(), max_tokens, "sending chat completion");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout
            } else {
                ChatError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout
            } else {
                ChatError::MalformedResponse(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::MalformedResponse("no choices in response".to_string()))?
            .message
            .content
            .ok_or_else(|| ChatError::MalformedResponse("choice has no message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
