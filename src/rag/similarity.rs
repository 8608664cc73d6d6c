//! Topic-drift detection between consecutive retrieval queries.
//!
//! Queries are reduced to sets of content words and compared with Jaccard
//! similarity. Conversational filler ("tell me more", "what about") carries
//! no topic, so a follow-up made only of filler scores as a perfect match.

use std::collections::HashSet;

/// Words dropped before comparison: English function words plus the filler
/// people use in follow-up questions.
const STOPWORDS: &[&str] = &[
    "a", "about", "again", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "describe", "detail", "details", "did", "do", "does", "else",
    "exactly", "explain", "for", "from", "give", "has", "have", "how", "i", "if", "in", "into",
    "is", "it", "its", "just", "know", "me", "more", "my", "of", "on", "or", "other", "our",
    "please", "really", "should", "show", "so", "some", "tell", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "to", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercased, stemmed content words of `text`.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .map(|word| stem(&word))
        .filter(|word| word.chars().count() > 1)
        .collect()
}

/// Strip common English plural endings.
fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    if word.len() > 4
        && word.ends_with("es")
        && ["ches", "shes", "xes"].iter().any(|suffix| word.ends_with(suffix))
    {
        return word[..word.len() - 2].to_string();
    }
    if word.len() > 3
        && word.ends_with('s')
        && !["ss", "us", "is"].iter().any(|suffix| word.ends_with(suffix))
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Size of the intersection over size of the union; two empty sets are
/// identical.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

/// Similarity of a new retrieval query to the previous one.
///
/// A candidate with no content words is a pure follow-up and scores 1.0.
pub fn query_similarity(candidate: &str, previous: &str) -> f32 {
    let candidate = tokenize(candidate);
    if candidate.is_empty() {
        return 1.0;
    }
    jaccard_similarity(&candidate, &tokenize(previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_tokenize_drops_filler_and_stems() {
        assert_eq!(tokenize("What are GNN approaches?"), set(&["gnn", "approach"]));
        assert_eq!(tokenize("What about GNNs exactly?"), set(&["gnn"]));
        assert_eq!(tokenize("Tell me more, please!"), set(&[]));
    }

    #[test]
    fn test_stemming_rules() {
        assert_eq!(stem("studies"), "study");
        assert_eq!(stem("classes"), "class");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("transformers"), "transformer");
        assert_eq!(stem("loss"), "loss");
        assert_eq!(stem("corpus"), "corpus");
        assert_eq!(stem("gas"), "gas");
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity(&set(&["a", "b"]), &set(&["a", "b"])), 1.0);
        assert_eq!(jaccard_similarity(&set(&["gnn", "approach"]), &set(&["gnn"])), 0.5);
        assert_eq!(jaccard_similarity(&set(&["x"]), &set(&["y"])), 0.0);
        assert_eq!(jaccard_similarity(&set(&[]), &set(&[])), 1.0);
        assert_eq!(jaccard_similarity(&set(&["x"]), &set(&[])), 0.0);
    }

    #[test]
    fn test_query_similarity() {
        assert_eq!(
            query_similarity("What about GNNs exactly?", "What are GNN approaches?"),
            0.5
        );
        assert_eq!(
            query_similarity(
                "completely unrelated topic about compilers",
                "What are GNN approaches?"
            ),
            0.0
        );
        assert_eq!(query_similarity("tell me more", "graph neural networks"), 1.0);
        assert_eq!(query_similarity("graph networks", "tell me more"), 0.0);
    }
}
