//! Retrieval-grounded question answering.
//!
//! [`ChatEngine::ask`] retrieves the papers most relevant to a question,
//! renders them into a bounded grounding context, hands question, history
//! and context to the generative model, and records the exchange in the
//! caller's [`ChatSession`] only when the model produced an answer.
//!
//! Retrieval is keyed on the current question alone; earlier turns reach the
//! model verbatim but never influence which papers are retrieved.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::generation::{GenerationError, GenerationRequest, GenerativeModel};
use crate::models::{SearchResult, Turn};
use crate::retrieval::Retriever;

/// Papers retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Grounding-context budget in characters unless configured otherwise.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Errors that can occur when asking a question.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The question was empty or whitespace only
    #[error("Question is empty")]
    EmptyQuestion,

    /// The model call failed; the session is unchanged and the ask may be retried
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Result type for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<Turn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn record_exchange(&mut self, question: &str, answer: &str) {
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::assistant(answer));
    }
}

/// A paper the answer was grounded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Position in the grounding context, starting at 1
    pub number: usize,
    pub id: String,
    pub title: String,
    pub year: i32,
    pub score: f32,
}

/// Answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub text: String,

    /// Papers actually included in the prompt, in rank order
    pub citations: Vec<Citation>,

    /// False when no paper could be put in front of the model
    pub grounded: bool,
}

/// Rendered context plus the papers it contains.
#[derive(Debug, Clone, Default)]
pub struct GroundingContext {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl GroundingContext {
    pub fn is_grounded(&self) -> bool {
        !self.citations.is_empty()
    }
}

fn render_block(number: usize, result: &SearchResult) -> String {
    let paper = &result.paper;
    let abstract_text = if paper.abstract_text.is_empty() {
        "(no abstract available)"
    } else {
        paper.abstract_text.as_str()
    };
    format!(
        "[{}] {} ({})\nAbstract: {}\n\n",
        number, paper.title, paper.publication_year, abstract_text
    )
}

/// Render ranked results into a context of at most `max_chars` characters.
///
/// Papers are taken in rank order and only ever included whole; the first
/// paper that no longer fits ends the context, so lower-ranked papers are
/// dropped. A top-ranked paper larger than the budget leaves the context empty.
pub fn build_grounding_context(results: &[SearchResult], max_chars: usize) -> GroundingContext {
    let mut context = GroundingContext::default();
    let mut used = 0;

    for (i, result) in results.iter().enumerate() {
        let number = i + 1;
        let block = render_block(number, result);
        let block_chars = block.chars().count();

        if used + block_chars > max_chars {
            debug!(
                kept = context.citations.len(),
                dropped = results.len() - i,
                budget = max_chars,
                "grounding context truncated"
            );
            break;
        }

        context.text.push_str(&block);
        used += block_chars;
        context.citations.push(Citation {
            number,
            id: result.paper.id.clone(),
            title: result.paper.title.clone(),
            year: result.paper.publication_year,
            score: result.score,
        });
    }

    context
}

/// Tunables for [`ChatEngine`].
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

/// Question-answering engine over one retrieval index and one model.
pub struct ChatEngine<R: Retriever, M: GenerativeModel> {
    retriever: R,
    model: M,
    config: ChatConfig,
}

impl<R: Retriever, M: GenerativeModel> ChatEngine<R, M> {
    pub fn new(retriever: R, model: M, config: ChatConfig) -> Self {
        Self {
            retriever,
            model,
            config,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    /// Answer a question and record the exchange.
    ///
    /// # Arguments
    /// * `session` - Conversation the question belongs to
    /// * `question` - Free-form question; surrounding whitespace is ignored
    ///
    /// # Returns
    /// The answer, the papers it was grounded in, and whether any were.
    ///
    /// # Errors
    /// [`ChatError::EmptyQuestion`] without calling the model, or
    /// [`ChatError::Generation`] when the model call fails. In both cases the
    /// session is left as it was.
    pub async fn ask(&self, session: &mut ChatSession, question: &str) -> ChatResult<ChatAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let results = match self.retriever.retrieve(question, self.config.top_k).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, index = self.retriever.name(), "retrieval failed");
                Vec::new()
            }
        };
        debug!(retrieved = results.len(), index = self.retriever.name(), "retrieved papers");

        let context = build_grounding_context(&results, self.config.max_context_chars);
        let grounded = context.is_grounded();
        if !grounded {
            warn!("no papers to ground the answer in");
        }

        let request = GenerationRequest {
            question,
            history: session.turns(),
            context: &context.text,
        };
        let answer = self.model.generate(&request).await?;

        session.record_exchange(question, &answer);
        debug!(model = self.model.model_name(), turns = session.len(), "answer recorded");

        Ok(ChatAnswer {
            text: answer,
            citations: context.citations,
            grounded,
        })
    }
}
