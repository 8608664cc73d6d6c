//! OpenAI-compatible embedding provider.
//!
//! Talks to any backend exposing `POST {base}/v1/embeddings` (OpenAI, LM Studio,
//! llama.cpp server, vLLM).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_non_empty, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::config::Config;

/// HTTP embedding client.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: Client,

    /// Full URL of the embeddings endpoint
    endpoint: String,

    /// Bearer token, if the backend requires one
    api_key: Option<String>,

    /// Model identifier sent with every request
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAIEmbedding {
    /// Create a client for `base_url` (with or without a trailing `/v1`).
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> EmbeddingResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint_url(base_url, "embeddings"),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &Config) -> EmbeddingResult<Self> {
        Self::new(
            &config.llm_backend_url,
            config.embedding_model.clone(),
            config.llm_backend_auth_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn request(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        let mut data = parsed.data;
        if data.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        // Backends may return items out of order; `index` is authoritative when present
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        if data.iter().any(|d| d.embedding.is_empty()) {
            return Err(EmbeddingError::MalformedResponse("empty embedding vector".to_string()));
        }

        debug!(count = data.len(), model = %self.model, "received embeddings");
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        ensure_non_empty(text)?;
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        for text in texts {
            ensure_non_empty(text)?;
        }
        self.request(texts).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Join an OpenAI-style resource path onto a base URL.
pub(crate) fn endpoint_url(base_url: &str, resource: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/{}", base, resource)
    } else {
        format!("{}/v1/{}", base, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAIEmbedding {
        OpenAIEmbedding::new(
            &server.uri(),
            "test-embed",
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("http://h:1234", "embeddings"), "http://h:1234/v1/embeddings");
        assert_eq!(endpoint_url("http://h:1234/", "embeddings"), "http://h:1234/v1/embeddings");
        assert_eq!(endpoint_url("http://h/v1/", "chat/completions"), "http://h/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"model": "test-embed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .mount(&server)
            .await;

        let embedding = client(&server).embed("graph networks").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_batch_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [2.0], "index": 1},
                    {"embedding": [1.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let embeddings = client(&server).embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_text() {
        let server = MockServer::start().await;
        let result = client(&server).embed("   ").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_embed_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        match client(&server).embed("text").await {
            Err(EmbeddingError::ApiError(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let result = client(&server).embed("text").await;
        assert!(matches!(result, Err(EmbeddingError::MalformedResponse(_))));
    }
}
