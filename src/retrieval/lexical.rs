//! BM25 lexical index.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{document_text, rank, RetrievalError, RetrievalResult, Retriever};
use crate::corpus::CorpusStore;
use crate::models::SearchResult;

/// Term-frequency saturation.
const K1: f32 = 1.2;
/// Document-length normalization.
const B: f32 = 0.75;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from",
    "has", "have", "how", "in", "into", "is", "it", "its", "of", "on", "or", "that", "the",
    "their", "there", "these", "this", "to", "was", "we", "were", "what", "which", "who", "why",
    "with",
];

/// Split text into lowercase alphanumeric terms, dropping stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Okapi BM25 index over title, abstract and keywords.
///
/// Only papers sharing at least one term with the question score above zero;
/// papers with no overlap are never returned.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    corpus: Arc<CorpusStore>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f32,
    doc_freqs: HashMap<String, usize>,
}

impl LexicalIndex {
    /// Build the index from a corpus snapshot.
    ///
    /// # Errors
    /// Returns [`RetrievalError::Unavailable`] when the corpus has papers but
    /// none of them carries indexable text.
    pub fn build(corpus: Arc<CorpusStore>) -> RetrievalResult<Self> {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lengths = Vec::with_capacity(corpus.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for paper in corpus.iter() {
            let tokens = tokenize(&document_text(paper));
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_default() += 1;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            doc_lengths.push(tokens.len());
            term_freqs.push(tf);
        }

        if !corpus.is_empty() && doc_freqs.is_empty() {
            return Err(RetrievalError::Unavailable(
                "no paper in the corpus has indexable text".to_string(),
            ));
        }

        let total_length: usize = doc_lengths.iter().sum();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total_length as f32 / doc_lengths.len() as f32
        };

        debug!(papers = corpus.len(), vocabulary = doc_freqs.len(), "built lexical index");

        Ok(Self {
            corpus,
            term_freqs,
            doc_lengths,
            avg_doc_length,
            doc_freqs,
        })
    }

    /// Rank papers against a question.
    pub fn query(&self, question: &str, k: usize) -> Vec<SearchResult> {
        if k == 0 || self.corpus.is_empty() {
            return Vec::new();
        }

        let terms: BTreeSet<String> = tokenize(question).into_iter().collect();
        let n = self.corpus.len() as f32;

        let candidates: Vec<(usize, f32)> = self
            .term_freqs
            .iter()
            .enumerate()
            .filter_map(|(i, tf)| {
                let length_norm = if self.avg_doc_length > 0.0 {
                    self.doc_lengths[i] as f32 / self.avg_doc_length
                } else {
                    0.0
                };
                let score: f32 = terms
                    .iter()
                    .filter_map(|term| {
                        let freq = *tf.get(term)? as f32;
                        let df = *self.doc_freqs.get(term)? as f32;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        Some(idf * freq * (K1 + 1.0) / (freq + K1 * (1.0 - B + B * length_norm)))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        rank(&self.corpus, candidates, k)
    }
}

#[async_trait]
impl Retriever for LexicalIndex {
    async fn retrieve(&self, question: &str, k: usize) -> RetrievalResult<Vec<SearchResult>> {
        Ok(self.query(question, k))
    }

    fn name(&self) -> &str {
        "bm25"
    }
}
