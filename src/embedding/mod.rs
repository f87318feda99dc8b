//! Text embeddings for the semantic retrieval index.
//!
//! Papers are embedded once when the index is built (see [`paper_text`]) and
//! questions are embedded per query. Two providers exist: an HTTP client for
//! OpenAI-compatible `/embeddings` endpoints and, with the `fastembed`
//! feature, an in-process model.

pub mod openai;

#[cfg(feature = "fastembed")]
pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The request never produced a response
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("text at position {index} is blank")]
    BlankText { index: usize },

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A model that maps text to fixed-size vectors.
///
/// Vectors for the same model must be comparable by cosine similarity.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed several texts; the output order matches `texts`.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Lowercase, trim and collapse runs of whitespace to a single space.
///
/// ```
/// use paper_insight::embedding::normalize_text;
/// assert_eq!(normalize_text("  Hello   World  "), "hello world");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The text a paper is embedded from: title, abstract and keywords, normalized.
///
/// Empty for a paper that carries none of them.
pub fn paper_text(paper: &Paper) -> String {
    let mut parts = vec![paper.title.as_str(), paper.abstract_text.as_str()];
    parts.extend(paper.keywords.iter().map(String::as_str));
    normalize_text(&parts.join(" "))
}

/// Reject a batch containing blank text before it reaches a model.
pub(crate) fn ensure_embeddable(texts: &[&str]) -> EmbeddingResult<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(index) => Err(EmbeddingError::BlankText { index }),
        None => Ok(()),
    }
}

/// Take the single vector out of a one-text batch.
pub(crate) fn single(mut vectors: Vec<Vec<f32>>) -> EmbeddingResult<Vec<f32>> {
    match vectors.len() {
        1 => Ok(vectors.remove(0)),
        got => Err(EmbeddingError::CountMismatch { expected: 1, got }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use std::collections::BTreeSet;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text("line\nbreaks\tand tabs"), "line breaks and tabs");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_paper_text_includes_keywords() {
        let paper = Paper {
            id: "W1".to_string(),
            title: "Graph  Neural Networks".to_string(),
            abstract_text: String::new(),
            publication_year: 2021,
            citation_count: 0,
            document_type: DocumentType::JournalArticle,
            venue_name: "Unknown".to_string(),
            authors: vec![],
            countries: BTreeSet::new(),
            institutions: BTreeSet::new(),
            keywords: vec!["Message Passing".to_string()],
        };
        assert_eq!(paper_text(&paper), "graph neural networks message passing");

        let blank = Paper {
            title: String::new(),
            keywords: vec![],
            ..paper
        };
        assert_eq!(paper_text(&blank), "");
    }

    #[test]
    fn test_ensure_embeddable_reports_position() {
        assert!(ensure_embeddable(&["a", "b"]).is_ok());
        assert!(matches!(
            ensure_embeddable(&["a", " \n", ""]),
            Err(EmbeddingError::BlankText { index: 1 })
        ));
    }

    #[test]
    fn test_single() {
        assert_eq!(single(vec![vec![1.0]]).unwrap(), vec![1.0]);
        assert!(matches!(
            single(vec![]),
            Err(EmbeddingError::CountMismatch { expected: 1, got: 0 })
        ));
    }
}
