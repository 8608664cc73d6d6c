//! Prompt text and message assembly for answer generation.

use crate::models::{ChatMessage, RetrievedPaper};

/// Number of trailing history turns sent with every request.
pub const HISTORY_WINDOW: usize = 10;

/// Default instructions for answer generation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant helping researchers explore \
conference papers. Answer questions using the papers provided in the context. When you refer to \
a paper, cite it by its number as an anchor link, for example [Paper 2](#paper-2). If the \
context does not contain the answer, say so instead of guessing. Be concise and accurate.";

/// Default instructions when no papers are sent with the question.
pub const CONVERSATION_SYSTEM_PROMPT: &str = "You are an AI assistant helping researchers explore \
conference papers. Answer from the conversation so far and your general knowledge. No papers are \
attached to this question, so do not cite any. Be concise and accurate.";

/// Fixed answer when a fresh retrieval finds nothing.
pub const NO_PAPERS_RESPONSE: &str = "I couldn't find any relevant papers for your question. \
Try rephrasing it or using different keywords.";

/// Render retrieved papers as numbered context blocks separated by a blank line.
pub fn build_context(papers: &[RetrievedPaper]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, retrieved)| {
            let paper = &retrieved.paper;
            let mut block = format!(
                "Paper {}:\nTitle: {}\nAuthors: {}\n",
                i + 1,
                paper.title,
                paper.authors_display()
            );
            if let Some(topic) = &paper.topic {
                block.push_str(&format!("Topic: {}\n", topic));
            }
            if let Some(decision) = &paper.decision {
                block.push_str(&format!("Decision: {}\n", decision));
            }
            block.push_str(&format!("Abstract: {}", paper.abstract_text));
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The last [`HISTORY_WINDOW`] turns of `history`.
pub fn recent_history(history: &[ChatMessage]) -> &[ChatMessage] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

/// System prompt, recent history, then one user turn carrying the context
/// block (when non-empty) followed by the question.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    context: &str,
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(recent_history(history));

    let user_turn = if context.is_empty() {
        question.to_string()
    } else {
        format!(
            "Context from relevant papers:\n\n{}\n\nQuestion: {}",
            context, question
        )
    };
    messages.push(ChatMessage::user(user_turn));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Paper, Role};

    fn retrieved(title: &str, authors: &[&str], topic: Option<&str>) -> RetrievedPaper {
        RetrievedPaper::new(
            Paper {
                uid: title.to_lowercase(),
                title: title.to_string(),
                abstract_text: format!("Abstract of {}", title),
                authors: authors.iter().map(|a| a.to_string()).collect(),
                session: Some("Session".to_string()),
                decision: topic.map(|_| "Accept (oral)".to_string()),
                topic: topic.map(String::from),
                keywords: vec![],
                award: None,
                url: None,
                year: 2025,
                conference: "NeurIPS".to_string(),
            },
            0.1,
        )
    }

    #[test]
    fn test_build_context_blocks() {
        let papers = vec![
            retrieved("First", &["Ada Lovelace", "Alan Turing"], Some("Graphs")),
            retrieved("Second", &[], None),
        ];
        let context = build_context(&papers);

        assert_eq!(
            context,
            "Paper 1:\nTitle: First\nAuthors: Ada Lovelace, Alan Turing\nTopic: Graphs\n\
             Decision: Accept (oral)\nAbstract: Abstract of First\n\n\
             Paper 2:\nTitle: Second\nAuthors: N/A\nAbstract: Abstract of Second"
        );
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_build_messages_window_and_context() {
        let history: Vec<ChatMessage> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{}", i))
                } else {
                    ChatMessage::assistant(format!("a{}", i))
                }
            })
            .collect();

        let messages = build_messages("sys", &history, "CTX", "Why?");
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0], ChatMessage::system("sys"));
        assert_eq!(messages[1].content, "q2");
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with("Context from relevant papers:\n\nCTX"));
        assert!(last.content.ends_with("Question: Why?"));
    }

    #[test]
    fn test_build_messages_without_context() {
        let messages = build_messages(DEFAULT_SYSTEM_PROMPT, &[], "", "Hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], ChatMessage::user("Hello"));
    }
}
