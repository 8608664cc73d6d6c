//! Best-effort rewriting of follow-up questions into retrieval queries.

use tracing::{debug, warn};

use super::prompt::recent_history;
use crate::chat::ChatClient;
use crate::models::ChatMessage;

const REWRITE_MAX_TOKENS: u32 = 100;
const REWRITE_TEMPERATURE: f32 = 0.3;

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite questions into short search queries for a \
database of research papers. Use the conversation to resolve references such as \"it\" or \
\"that approach\". Reply with the search query only, without explanation or quotes.";

/// Result of [`try_rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten(String),
    Unchanged,
}

impl RewriteOutcome {
    /// The query to retrieve with: the rewrite, or `original` when unchanged.
    pub fn query_or<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            RewriteOutcome::Rewritten(query) => query,
            RewriteOutcome::Unchanged => original,
        }
    }
}

/// Ask the chat backend for a compact retrieval query.
///
/// Never fails: backend errors and unusable replies yield
/// [`RewriteOutcome::Unchanged`].
pub async fn try_rewrite(
    chat: &dyn ChatClient,
    question: &str,
    history: &[ChatMessage],
) -> RewriteOutcome {
    let mut messages = vec![ChatMessage::system(REWRITE_SYSTEM_PROMPT)];
    messages.extend_from_slice(recent_history(history));
    messages.push(ChatMessage::user(format!(
        "Rewrite this question as a search query: {}",
        question
    )));

    match chat
        .complete(&messages, REWRITE_TEMPERATURE, REWRITE_MAX_TOKENS)
        .await
    {
        Ok(reply) => match clean_reply(&reply) {
            Some(query) => {
                debug!(original = %question, rewritten = %query, "rewrote query");
                RewriteOutcome::Rewritten(query)
            }
            None => {
                warn!("query rewrite returned an empty reply, using original question");
                RewriteOutcome::Unchanged
            }
        },
        Err(e) => {
            warn!(error = %e, "query rewrite failed, using original question");
            RewriteOutcome::Unchanged
        }
    }
}

/// First non-empty line of the reply without surrounding quotes.
fn clean_reply(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|line| !line.is_empty())?;
    let query = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!query.is_empty()).then(|| query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatError, ChatResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubChat {
        reply: Mutex<Option<ChatResult<String>>>,
        seen: Mutex<Vec<(usize, f32, u32)>>,
    }

    impl StubChat {
        fn new(reply: ChatResult<String>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for StubChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            temperature: f32,
            max_tokens: u32,
        ) -> ChatResult<String> {
            self.seen
                .lock()
                .unwrap()
                .push((messages.len(), temperature, max_tokens));
            self.reply.lock().unwrap().take().unwrap_or(Err(ChatError::Timeout))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_rewrite_uses_small_budget_and_history() {
        let chat = StubChat::new(Ok("  \"graph neural network approaches\"\n".to_string()));
        let history = vec![
            ChatMessage::user("What are GNNs?"),
            ChatMessage::assistant("Graph neural networks."),
        ];

        let outcome = try_rewrite(&chat, "What about them?", &history).await;
        assert_eq!(
            outcome,
            RewriteOutcome::Rewritten("graph neural network approaches".to_string())
        );
        assert_eq!(*chat.seen.lock().unwrap(), vec![(4, 0.3, 100)]);
    }

    #[tokio::test]
    async fn test_rewrite_failures_leave_question_unchanged() {
        let failing = StubChat::new(Err(ChatError::Status {
            status: 500,
            body: "boom".to_string(),
        }));
        let outcome = try_rewrite(&failing, "original", &[]).await;
        assert_eq!(outcome, RewriteOutcome::Unchanged);
        assert_eq!(outcome.query_or("original"), "original");

        let empty = StubChat::new(Ok(" \n \"\" ".to_string()));
        assert_eq!(try_rewrite(&empty, "original", &[]).await, RewriteOutcome::Unchanged);
    }
}
