//! Runtime configuration.
//!
//! A single [`Config`] is built at process start (usually from environment
//! variables) and handed to the constructors that need it. Nothing in the
//! library reads the environment on its own.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// Parsed values are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Http,
    /// fastembed running in-process (requires the `local-embeddings` feature)
    Local,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "openai" | "remote" => Ok(EmbeddingBackend::Http),
            "local" | "fastembed" => Ok(EmbeddingBackend::Local),
            other => Err(format!("unknown embedding backend '{}'", other)),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the OpenAI-compatible LLM backend
    pub llm_backend_url: String,

    /// Bearer token for the backend, if it requires one
    pub llm_backend_auth_token: Option<String>,

    /// Chat-completion model
    pub chat_model: String,

    /// Embedding model
    pub embedding_model: String,

    pub embedding_backend: EmbeddingBackend,

    /// SQLite file holding paper metadata
    pub paper_db_path: PathBuf,

    /// SQLite file holding the vector index
    pub embedding_db_path: PathBuf,

    /// Vector collection name
    pub collection_name: String,

    /// Papers retrieved per question when the caller does not say otherwise
    pub max_context_papers: usize,

    pub chat_temperature: f32,

    pub chat_max_tokens: u32,

    /// Rewrite follow-up questions into standalone retrieval queries
    pub enable_query_rewriting: bool,

    /// Jaccard similarity at or above which cached papers are reused
    pub query_similarity_threshold: f32,

    /// Timeout applied to every HTTP request
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            llm_backend_url: "http://localhost:1234".to_string(),
            llm_backend_auth_token: None,
            chat_model: "gemma-3-4b-it-qat".to_string(),
            embedding_model: "text-embedding-qwen3-embedding-4b".to_string(),
            embedding_backend: EmbeddingBackend::Http,
            paper_db_path: data_dir.join("papers.db"),
            embedding_db_path: data_dir.join("embeddings.db"),
            collection_name: "papers".to_string(),
            max_context_papers: 5,
            chat_temperature: 0.7,
            chat_max_tokens: 1000,
            enable_query_rewriting: true,
            query_similarity_threshold: 0.5,
            request_timeout_secs: 60,
        }
    }
}

/// Default directory for the SQLite files.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("paper-rag"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset or empty keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("LLM_BACKEND_URL") {
            config.llm_backend_url = v;
        }
        if let Some(v) = get("LLM_BACKEND_AUTH_TOKEN") {
            config.llm_backend_auth_token = Some(v);
        }
        if let Some(v) = get("CHAT_MODEL") {
            config.chat_model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = get("EMBEDDING_BACKEND") {
            config.embedding_backend = parse("EMBEDDING_BACKEND", &v)?;
        }
        if let Some(v) = get("PAPER_DB_PATH") {
            config.paper_db_path = PathBuf::from(v);
        }
        if let Some(v) = get("EMBEDDING_DB_PATH") {
            config.embedding_db_path = PathBuf::from(v);
        }
        if let Some(v) = get("COLLECTION_NAME") {
            config.collection_name = v;
        }
        if let Some(v) = get("MAX_CONTEXT_PAPERS") {
            config.max_context_papers = parse("MAX_CONTEXT_PAPERS", &v)?;
        }
        if let Some(v) = get("CHAT_TEMPERATURE") {
            config.chat_temperature = parse("CHAT_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("CHAT_MAX_TOKENS") {
            config.chat_max_tokens = parse("CHAT_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("ENABLE_QUERY_REWRITING") {
            config.enable_query_rewriting = parse_bool("ENABLE_QUERY_REWRITING", &v)?;
        }
        if let Some(v) = get("QUERY_SIMILARITY_THRESHOLD") {
            config.query_similarity_threshold = parse("QUERY_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse("REQUEST_TIMEOUT_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable together.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.llm_backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid("llm_backend_url cannot be empty".to_string()));
        }
        if self.max_context_papers == 0 {
            return Err(ConfigError::Invalid(
                "max_context_papers must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.query_similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "query_similarity_threshold must be within [0, 1], got {}",
                self.query_similarity_threshold
            )));
        }
        if self.collection_name.trim().is_empty() {
            return Err(ConfigError::Invalid("collection_name cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
