//! Local embedding provider backed by fastembed.
//!
//! Runs ONNX sentence-embedding models in-process, so abstracts can be indexed
//! without an embedding server. Model files are downloaded into the cache
//! directory on first use.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

use super::{ensure_non_empty, EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// In-process embedding model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

/// Resolve a configured model name into a fastembed model and its dimension.
fn resolve_model(name: &str) -> EmbeddingResult<(EmbeddingModel, usize)> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match key.as_str() {
        "allminilml6v2" | "sentencetransformersallminilml6v2" => {
            Ok((EmbeddingModel::AllMiniLML6V2, 384))
        }
        "bgesmallenv15" | "baaibgesmallenv15" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bgebaseenv15" | "baaibgebaseenv15" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "bgelargeenv15" | "baaibgelargeenv15" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "nomicembedtextv15" | "nomicainomicembedtextv15" => {
            Ok((EmbeddingModel::NomicEmbedTextV15, 768))
        }
        _ => Err(EmbeddingError::ConfigError(format!(
            "'{}' is not a supported local embedding model",
            name
        ))),
    }
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it into `cache_dir` if needed.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` for unknown models or when the
    /// model cannot be initialized
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let (model, dimension) = resolve_model(model_name)?;

        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|p| p.join("fastembed"))
                .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
        });
        info!(model = model_name, cache_dir = %cache_dir.display(), "loading local embedding model");

        let text_embedding = TextEmbedding::try_new(InitOptions::new(model).with_cache_dir(cache_dir))
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to initialize fastembed model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        ensure_non_empty(text)?;
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        for text in texts {
            ensure_non_empty(text)?;
        }

        let model = self.model.lock().await;
        let inputs: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        model
            .embed(inputs, None)
            .map_err(|e| EmbeddingError::ApiError(format!("Local embedding failed: {}", e)))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_names() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").unwrap().1, 384);
        assert_eq!(resolve_model("BAAI/bge-base-en-v1.5").unwrap().1, 768);
        assert!(resolve_model("text-embedding-3-small").is_err());
    }
}
