//! Core data models for the paper RAG system.
//!
//! This module contains the records shared across layers: canonical paper
//! metadata, papers enriched with retrieval distances, chat messages that make
//! up a conversation, and the embedding configuration recorded by the vector
//! index.

use serde::{Deserialize, Serialize};

/// Canonical metadata for a conference paper.
///
/// Papers are produced by the normalization layer in [`crate::provider`],
/// persisted by the paper store and treated as read-only by the RAG session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Stable unique identifier
    pub uid: String,

    /// Paper title
    pub title: String,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Author display names in byline order
    pub authors: Vec<String>,

    /// Conference session the paper was presented in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Acceptance decision (e.g. "Accept (oral)")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// Topic or primary area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Award name, if the paper received one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Conference year
    pub year: i32,

    /// Conference name (e.g. "NeurIPS")
    pub conference: String,
}

impl Paper {
    /// Authors joined for display, `N/A` when the list is empty.
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "N/A".to_string()
        } else {
            self.authors.join(", ")
        }
    }
}

/// Relevance classification for retrieved papers.
///
/// Used by the command-line front ends to label results; the thresholds apply
/// to [`RetrievedPaper::similarity`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// similarity > 0.95
    Identical,

    /// similarity > 0.85
    HighlySimilar,

    /// similarity > 0.70
    Similar,

    /// Anything below
    Relevant,
}

impl RelevanceLevel {
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity > 0.95 {
            RelevanceLevel::Identical
        } else if similarity > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if similarity > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A paper returned by a vector-index query.
///
/// Derived per query and never persisted. `similarity` is always within
/// `[0, 1]` and is exactly zero once the raw distance exceeds one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedPaper {
    #[serde(flatten)]
    pub paper: Paper,

    /// Raw distance reported by the vector index
    pub distance: f32,

    /// `max(0, 1 - distance)`
    pub similarity: f32,
}

impl RetrievedPaper {
    pub fn new(paper: Paper, distance: f32) -> Self {
        Self {
            paper,
            distance,
            similarity: similarity_from_distance(distance),
        }
    }

    pub fn relevance(&self) -> RelevanceLevel {
        RelevanceLevel::from_similarity(self.similarity)
    }
}

/// Convert a raw cosine distance into a similarity clamped to `[0, 1]`.
pub fn similarity_from_distance(distance: f32) -> f32 {
    if !distance.is_finite() || distance > 1.0 {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message sent to or received from the chat backend.
///
/// Conversation history is a sequence of these, alternating user and
/// assistant turns starting with the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Embedding model recorded alongside a vector collection.
///
/// Written on first insert so that later ingestion runs and query-time
/// embedding use the same model and dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name of the embedding model (e.g. "text-embedding-qwen3-embedding-4b")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> Paper {
        Paper {
            uid: "p1".to_string(),
            title: "Graph Networks".to_string(),
            abstract_text: "We study graphs.".to_string(),
            authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
            session: None,
            decision: Some("Accept (poster)".to_string()),
            topic: None,
            keywords: vec![],
            award: None,
            url: None,
            year: 2025,
            conference: "NeurIPS".to_string(),
        }
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-6);
        assert_eq!(similarity_from_distance(1.0), 0.0);
        assert_eq!(similarity_from_distance(1.5), 0.0);
        assert_eq!(similarity_from_distance(f32::NAN), 0.0);
        // Float noise below zero must not push similarity above one
        assert_eq!(similarity_from_distance(-1e-7), 1.0);
    }

    #[test]
    fn test_retrieved_paper_similarity_bounds() {
        for distance in [0.0_f32, 0.1, 0.5, 0.99, 1.0, 1.01, 1.7, 2.0] {
            let retrieved = RetrievedPaper::new(paper(), distance);
            assert!((0.0..=1.0).contains(&retrieved.similarity));
            if distance > 1.0 {
                assert_eq!(retrieved.similarity, 0.0);
            }
        }
    }

    #[test]
    fn test_relevance_level_from_similarity() {
        assert_eq!(RelevanceLevel::from_similarity(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_similarity(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_similarity(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_similarity(0.60), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_authors_display() {
        let mut p = paper();
        assert_eq!(p.authors_display(), "Ada Lovelace, Alan Turing");
        p.authors.clear();
        assert_eq!(p.authors_display(), "N/A");
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_paper_abstract_field_name() {
        let value = serde_json::to_value(paper()).unwrap();
        assert_eq!(value["abstract"], "We study graphs.");
        assert!(value.get("session").is_none());
    }
}
