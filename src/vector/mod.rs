//! Vector index abstraction.
//!
//! A vector index stores one embedding per paper abstract together with the
//! abstract text and a flat string metadata map, and answers k-nearest
//! neighbour queries ordered by ascending cosine distance.

pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::EmbeddingConfig;

/// Flat string metadata stored next to each vector.
pub type Metadata = BTreeMap<String, String>;

/// Errors that can occur during vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Backend failure
    #[error("Vector index backend error: {0}")]
    Backend(String),

    /// Vector length disagrees with the collection
    #[error("Embedding dimension mismatch: collection has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Stored data could not be decoded
    #[error("Corrupt index entry: {0}")]
    Corrupt(String),

    /// A filter expression could not be parsed
    #[error("Invalid metadata filter: {0}")]
    InvalidFilter(String),
}

/// Result type for vector index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result of a nearest-neighbour query.
///
/// All four vectors have the same length and are ordered by ascending
/// distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorHits {
    pub ids: Vec<String>,
    pub distances: Vec<f32>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl VectorHits {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, id: String, distance: f32, document: String, metadata: Metadata) {
        self.ids.push(id);
        self.distances.push(distance);
        self.documents.push(document);
        self.metadatas.push(metadata);
    }
}

/// Structured predicate over [`Metadata`].
///
/// Can be parsed from the Chroma-style `where` syntax:
///
/// ```ignore
/// let filter = MetadataFilter::from_json(&json!({
///     "$and": [{"year": 2025}, {"conference": {"$in": ["NeurIPS", "ICLR"]}}]
/// }))?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    /// `key == value`
    Eq(String, String),
    /// `key != value` (missing keys match)
    Ne(String, String),
    /// `key` is one of `values`
    In(String, Vec<String>),
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        MetadataFilter::Eq(key.into(), value.into())
    }

    /// Evaluate the predicate against one metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::Eq(key, value) => metadata.get(key) == Some(value),
            MetadataFilter::Ne(key, value) => metadata.get(key) != Some(value),
            MetadataFilter::In(key, values) => metadata
                .get(key)
                .map(|v| values.iter().any(|candidate| candidate == v))
                .unwrap_or(false),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }

    /// Parse a Chroma-style `where` object.
    pub fn from_json(value: &JsonValue) -> IndexResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| IndexError::InvalidFilter("filter must be a JSON object".to_string()))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            let clause = match key.as_str() {
                "$and" | "$or" => {
                    let items = value.as_array().ok_or_else(|| {
                        IndexError::InvalidFilter(format!("{} expects an array", key))
                    })?;
                    let parsed = items
                        .iter()
                        .map(Self::from_json)
                        .collect::<IndexResult<Vec<_>>>()?;
                    if key == "$and" {
                        MetadataFilter::And(parsed)
                    } else {
                        MetadataFilter::Or(parsed)
                    }
                }
                op if op.starts_with('$') => {
                    return Err(IndexError::InvalidFilter(format!("unsupported operator {}", op)))
                }
                field => Self::parse_field(field, value)?,
            };
            clauses.push(clause);
        }

        match clauses.len() {
            0 => Err(IndexError::InvalidFilter("empty filter".to_string())),
            1 => Ok(clauses.remove(0)),
            _ => Ok(MetadataFilter::And(clauses)),
        }
    }

    fn parse_field(field: &str, value: &JsonValue) -> IndexResult<Self> {
        match value {
            JsonValue::Object(ops) => {
                let mut parsed = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    let clause = match op.as_str() {
                        "$eq" => MetadataFilter::Eq(field.to_string(), scalar_to_string(operand)?),
                        "$ne" => MetadataFilter::Ne(field.to_string(), scalar_to_string(operand)?),
                        "$in" => {
                            let values = operand
                                .as_array()
                                .ok_or_else(|| {
                                    IndexError::InvalidFilter("$in expects an array".to_string())
                                })?
                                .iter()
                                .map(scalar_to_string)
                                .collect::<IndexResult<Vec<_>>>()?;
                            MetadataFilter::In(field.to_string(), values)
                        }
                        other => {
                            return Err(IndexError::InvalidFilter(format!(
                                "unsupported operator {}",
                                other
                            )))
                        }
                    };
                    parsed.push(clause);
                }
                match parsed.len() {
                    0 => Err(IndexError::InvalidFilter(format!("no operator for {}", field))),
                    1 => Ok(parsed.remove(0)),
                    _ => Ok(MetadataFilter::And(parsed)),
                }
            }
            scalar => Ok(MetadataFilter::Eq(field.to_string(), scalar_to_string(scalar)?)),
        }
    }
}

fn scalar_to_string(value: &JsonValue) -> IndexResult<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(IndexError::InvalidFilter(format!("unsupported value {}", other))),
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
///
/// # Errors
/// Returns `IndexError::DimensionMismatch` if the lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> IndexResult<f32> {
    if a.len() != b.len() {
        return Err(IndexError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot_product / (norm_a * norm_b))
}

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for `id`.
    async fn upsert(
        &self,
        id: &str,
        embedding: &[f32],
        document: &str,
        metadata: &Metadata,
    ) -> IndexResult<()>;

    /// The `k` entries closest to `embedding` that satisfy `filter`.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<VectorHits>;

    async fn contains(&self, id: &str) -> IndexResult<bool>;

    async fn count(&self) -> IndexResult<usize>;

    /// Embedding model recorded for this collection, if any.
    async fn embedding_config(&self) -> IndexResult<Option<EmbeddingConfig>>;

    /// Record the embedding model used to populate this collection.
    async fn set_embedding_config(&self, config: &EmbeddingConfig) -> IndexResult<()>;
}
