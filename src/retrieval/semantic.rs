//! Embedding-based retrieval.
//!
//! Each paper is embedded once at build time (see [`paper_text`]);
//! queries are embedded on the fly and compared by cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{rank, RetrievalError, RetrievalResult, Retriever};
use crate::corpus::CorpusStore;
use crate::embedding::{normalize_text, paper_text, EmbeddingProvider};
use crate::models::SearchResult;

/// Papers embedded per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Compute cosine similarity between two vectors.
///
/// Ranges from -1 to 1. Vectors of different length or with zero magnitude
/// have no meaningful angle and score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a * norm_b)
}

/// Dense-vector index backed by an embedding provider.
pub struct SemanticIndex<E: EmbeddingProvider> {
    corpus: Arc<CorpusStore>,
    provider: E,
    /// One vector per paper; `None` for papers without embeddable text
    vectors: Vec<Option<Vec<f32>>>,
}

impl<E: EmbeddingProvider> SemanticIndex<E> {
    /// Embed every paper of the corpus.
    ///
    /// # Errors
    /// Returns [`RetrievalError::Unavailable`] when a non-empty corpus has no
    /// embeddable text, and [`RetrievalError::Embedding`] if the provider fails.
    pub async fn build(corpus: Arc<CorpusStore>, provider: E, batch_size: usize) -> RetrievalResult<Self> {
        let texts: Vec<String> = corpus.iter().map(paper_text).collect();

        let embeddable: Vec<usize> = (0..texts.len()).filter(|&i| !texts[i].is_empty()).collect();
        if !corpus.is_empty() && embeddable.is_empty() {
            return Err(RetrievalError::Unavailable(
                "no paper in the corpus has embeddable text".to_string(),
            ));
        }

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for chunk in embeddable.chunks(batch_size.max(1)) {
            let batch: Vec<&str> = chunk.iter().map(|&i| texts[i].as_str()).collect();
            let embeddings = provider.embed_batch(&batch).await?;
            if embeddings.len() != chunk.len() {
                return Err(RetrievalError::Unavailable(format!(
                    "provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            for (&i, embedding) in chunk.iter().zip(embeddings) {
                vectors[i] = Some(embedding);
            }
        }

        let skipped = texts.len() - embeddable.len();
        if skipped > 0 {
            warn!(skipped, "papers without text left out of the semantic index");
        }
        debug!(papers = embeddable.len(), model = provider.model_name(), "built semantic index");

        Ok(Self {
            corpus,
            provider,
            vectors,
        })
    }
}

#[async_trait]
impl<E: EmbeddingProvider> Retriever for SemanticIndex<E> {
    async fn retrieve(&self, question: &str, k: usize) -> RetrievalResult<Vec<SearchResult>> {
        let question = normalize_text(question);
        if k == 0 || self.corpus.is_empty() || question.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.provider.embed(&question).await?;
        let candidates: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let score = cosine_similarity(&query, v.as_ref()?);
                (score > 0.0).then_some((i, score))
            })
            .collect();

        Ok(rank(&self.corpus, candidates, k))
    }

    fn name(&self) -> &str {
        self.provider.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::retrieval::tests::paper;
    use std::sync::Mutex;

    /// Embeds text as counts of a fixed keyword vocabulary.
    struct KeywordEmbedding {
        batch_calls: Mutex<Vec<usize>>,
        should_fail: bool,
    }

    const VOCAB: [&str; 3] = ["graph", "protein", "climate"];

    impl KeywordEmbedding {
        fn new() -> Self {
            Self {
                batch_calls: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new()
            }
        }

        fn vector(text: &str) -> Vec<f32> {
            VOCAB.iter().map(|w| text.matches(w).count() as f32).collect()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedding {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.should_fail {
                return Err(EmbeddingError::Request("mock failure".to_string()));
            }
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            if self.should_fail {
                return Err(EmbeddingError::Request("mock failure".to_string()));
            }
            self.batch_calls.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn dimension(&self) -> usize {
            VOCAB.len()
        }

        fn model_name(&self) -> &str {
            "keyword-mock"
        }
    }

    fn corpus() -> Arc<CorpusStore> {
        Arc::new(CorpusStore::from_papers(vec![
            paper("W1", "Graph networks", "graph message passing", 1),
            paper("W2", "Protein folding", "protein structure", 2),
            paper("W3", "", "", 3),
            paper("W4", "Climate and graph", "climate graph", 4),
        ]))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_batches_and_skips_empty_text() {
        let index = SemanticIndex::build(corpus(), KeywordEmbedding::new(), 2).await.unwrap();
        assert_eq!(*index.provider.batch_calls.lock().unwrap(), vec![2, 1]);
        assert!(index.vectors[2].is_none());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_similarity() {
        let index = SemanticIndex::build(corpus(), KeywordEmbedding::new(), 64).await.unwrap();
        let results = index.retrieve("graph", 10).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["W1", "W4"]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_empty() {
        let index = SemanticIndex::build(Arc::new(CorpusStore::default()), KeywordEmbedding::new(), 8)
            .await
            .unwrap();
        assert!(index.retrieve("graph", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_propagates() {
        let result = SemanticIndex::build(corpus(), KeywordEmbedding::with_failure(), 8).await;
        assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_corpus_without_text_is_unavailable() {
        let corpus = Arc::new(CorpusStore::from_papers(vec![paper("W1", "", "", 0)]));
        let result = SemanticIndex::build(corpus, KeywordEmbedding::new(), 8).await;
        assert!(matches!(result, Err(RetrievalError::Unavailable(_))));
    }
}
