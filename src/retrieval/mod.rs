//! Retrieval over the corpus.
//!
//! An index is built once from a corpus snapshot and answers "which papers
//! are most relevant to this question" queries for the chat engine. Two
//! implementations share the [`Retriever`] interface:
//!
//! - [`lexical::LexicalIndex`]: BM25 over title, abstract and keywords; no
//!   external infrastructure, the default.
//! - [`semantic::SemanticIndex`]: cosine similarity between embeddings from
//!   an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
//!
//! Results are ordered by descending score; ties fall back to descending
//! citation count and then ascending paper identifier, so a fixed index and
//! question always produce the same ranking.

pub mod lexical;
pub mod semantic;

use async_trait::async_trait;
use thiserror::Error;

use crate::corpus::CorpusStore;
use crate::embedding::EmbeddingError;
use crate::models::SearchResult;

pub use lexical::LexicalIndex;
pub use semantic::SemanticIndex;

/// Errors that can occur while building or querying an index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The corpus has no text an index could be built from
    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Trait for ranked retrieval over a corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` papers relevant to `question`, best first.
    ///
    /// Only papers with a positive score count as relevant, so a `k` larger
    /// than the corpus returns every matching paper rather than the whole
    /// corpus, and a question sharing nothing with the corpus returns none.
    /// An empty corpus yields an empty result, never an error.
    async fn retrieve(&self, question: &str, k: usize) -> RetrievalResult<Vec<SearchResult>>;

    /// Human-readable name of the index, for logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Retriever + ?Sized> Retriever for Box<T> {
    async fn retrieve(&self, question: &str, k: usize) -> RetrievalResult<Vec<SearchResult>> {
        (**self).retrieve(question, k).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Turn `(paper position, score)` candidates into the top-`k` ranked results.
pub(crate) fn rank(corpus: &CorpusStore, mut candidates: Vec<(usize, f32)>, k: usize) -> Vec<SearchResult> {
    let papers = corpus.papers();
    candidates.sort_by(|&(a, score_a), &(b, score_b)| {
        score_b
            .total_cmp(&score_a)
            .then_with(|| papers[b].citation_count.cmp(&papers[a].citation_count))
            .then_with(|| papers[a].id.cmp(&papers[b].id))
    });
    candidates.truncate(k);

    candidates
        .into_iter()
        .map(|(i, score)| SearchResult::new(papers[i].clone(), score))
        .collect()
}

/// Text a paper is indexed under.
pub(crate) fn document_text(paper: &crate::models::Paper) -> String {
    let mut text = String::with_capacity(paper.title.len() + paper.abstract_text.len() + 1);
    text.push_str(&paper.title);
    text.push(' ');
    text.push_str(&paper.abstract_text);
    for keyword in &paper.keywords {
        text.push(' ');
        text.push_str(keyword);
    }
    text
}
