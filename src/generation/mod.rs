//! Generative model boundary.
//!
//! The chat engine hands the model a question, the prior conversation and a
//! grounding context, and gets answer text back. Transport and credentials
//! live in the implementations; [`openai::OpenAiChatModel`] speaks the
//! OpenAI-compatible chat-completions protocol.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Turn;

/// Instructions prepended to every grounded request.
pub const SYSTEM_PROMPT: &str = "You are a research assistant answering questions about a corpus of \
scholarly papers. Answer using only the papers in the context below. Cite papers by their \
bracketed number, e.g. [2]. If the context does not contain the answer, say so.";

/// Instructions used when retrieval found nothing to ground the answer in.
pub const UNGROUNDED_PROMPT: &str = "You are a research assistant. No papers from the corpus matched \
this question, so state clearly that your answer is not grounded in the corpus.";

/// Errors that can occur when calling the generative model.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request did not complete in time
    #[error("Model request timed out: {0}")]
    Timeout(String),

    /// Quota or rate limit exhausted
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The API answered with an error status
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    /// The response could not be interpreted as an answer
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GenerationError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout(_)
            | GenerationError::RateLimited(_)
            | GenerationError::Transport(_) => true,
            GenerationError::Api { status, .. } => *status >= 500,
            GenerationError::MalformedResponse(_) => false,
        }
    }
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Everything the model sees for one question.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,

    /// Prior turns, oldest first
    pub history: &'a [Turn],

    /// Rendered grounding context; empty when ungrounded
    pub context: &'a str,
}

impl GenerationRequest<'_> {
    pub fn is_grounded(&self) -> bool {
        !self.context.trim().is_empty()
    }
}

/// A role-tagged message in chat-completions form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Flatten a request into system, history and user messages.
pub fn build_messages(request: &GenerationRequest<'_>) -> Vec<Message> {
    let system = if request.is_grounded() {
        format!("{}\n\nContext:\n{}", SYSTEM_PROMPT, request.context)
    } else {
        UNGROUNDED_PROMPT.to_string()
    };

    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(Message::new("system", system));
    messages.extend(
        request
            .history
            .iter()
            .map(|turn| Message::new(turn.role.as_str(), turn.text.clone())),
    );
    messages.push(Message::new("user", request.question));
    messages
}

/// Trait for text generation backends.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Produce an answer for the request.
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<T: GenerativeModel + ?Sized> GenerativeModel for Box<T> {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String> {
        (**self).generate(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_grounded() {
        let history = vec![Turn::user("first question"), Turn::assistant("first answer")];
        let request = GenerationRequest {
            question: "second question",
            history: &history,
            context: "[1] Some Paper (2021)",
        };
        let messages = build_messages(&request);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.starts_with(SYSTEM_PROMPT));
        assert!(messages[0].content.contains("[1] Some Paper (2021)"));
        assert_eq!(messages[1], Message::new("user", "first question"));
        assert_eq!(messages[2], Message::new("assistant", "first answer"));
        assert_eq!(messages[3], Message::new("user", "second question"));
    }

    #[test]
    fn test_build_messages_ungrounded() {
        let request = GenerationRequest {
            question: "anything",
            history: &[],
            context: "  ",
        };
        assert!(!request.is_grounded());
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, UNGROUNDED_PROMPT);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GenerationError::Timeout("t".into()).is_retryable());
        assert!(GenerationError::RateLimited("quota".into()).is_retryable());
        assert!(GenerationError::Api { status: 503, message: "down".into() }.is_retryable());
        assert!(!GenerationError::Api { status: 400, message: "bad".into() }.is_retryable());
        assert!(!GenerationError::MalformedResponse("no choices".into()).is_retryable());
    }
}
