//! Analysis session.
//!
//! A [`Session`] owns everything one run works with: the configuration, the
//! corpus built from fetched records, the aggregates computed from it and the
//! conversation history. It is created once per run and passed by reference;
//! nothing in the crate keeps global state.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::aggregation::AggregateStats;
use crate::chat::{ChatAnswer, ChatEngine, ChatResult, ChatSession};
use crate::config::{AppConfig, ConfigError};
use crate::corpus::{CorpusStore, NormalizationStats};
use crate::embedding::EmbeddingProvider;
use crate::generation::GenerativeModel;
use crate::normalizer::RawRecord;
use crate::provider::{ProgressFn, ProviderError, RecordSource};
use crate::retrieval::{LexicalIndex, RetrievalResult, Retriever, SemanticIndex};

/// Errors that can occur while setting up a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No record survived normalization
    #[error("No papers found matching these parameters ({processed} records processed, {rejected} rejected)")]
    EmptyCorpus { processed: usize, rejected: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

pub struct Session {
    config: AppConfig,
    corpus: Arc<CorpusStore>,
    normalization: NormalizationStats,
    stats: AggregateStats,
    chat: ChatSession,
}

impl Session {
    /// Build the corpus and its aggregates from raw records.
    ///
    /// # Errors
    /// [`SessionError::Config`] for an invalid configuration, and
    /// [`SessionError::EmptyCorpus`] when no record is accepted.
    pub fn from_records<I>(config: AppConfig, records: I) -> SessionResult<Self>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        config.validate()?;

        let filter = config.filter.to_filter();
        let (corpus, normalization) = CorpusStore::build(records, &filter, config.fetch.max_records);
        if corpus.is_empty() {
            return Err(SessionError::EmptyCorpus {
                processed: normalization.total_processed,
                rejected: normalization.total_rejected(),
            });
        }

        let stats = AggregateStats::compute(&corpus);
        info!(
            papers = stats.total_papers,
            citations = stats.total_citations,
            years = stats.yearly_counts.len(),
            "session ready"
        );

        Ok(Self {
            config,
            corpus: Arc::new(corpus),
            normalization,
            stats,
            chat: ChatSession::new(),
        })
    }

    /// Fetch records from `source` and build the session from them.
    pub async fn load(config: AppConfig, source: &dyn RecordSource, progress: ProgressFn<'_>) -> SessionResult<Self> {
        config.validate()?;
        info!(source = source.name(), limit = config.fetch.max_records, "loading records");
        let records = source.fetch_records(config.fetch.max_records, progress).await?;
        Self::from_records(config, records)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared handle to the corpus.
    pub fn corpus(&self) -> Arc<CorpusStore> {
        Arc::clone(&self.corpus)
    }

    pub fn normalization(&self) -> &NormalizationStats {
        &self.normalization
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn chat_history(&self) -> &ChatSession {
        &self.chat
    }

    pub fn lexical_index(&self) -> RetrievalResult<LexicalIndex> {
        LexicalIndex::build(self.corpus())
    }

    pub async fn semantic_index<E: EmbeddingProvider>(&self, provider: E) -> RetrievalResult<SemanticIndex<E>> {
        SemanticIndex::build(self.corpus(), provider, crate::retrieval::semantic::DEFAULT_BATCH_SIZE).await
    }

    /// Build a chat engine over `retriever` and `model` using the session's settings.
    pub fn chat_engine<R: Retriever, M: GenerativeModel>(&self, retriever: R, model: M) -> ChatEngine<R, M> {
        ChatEngine::new(retriever, model, self.config.chat_config())
    }

    /// Ask a question within this session's conversation.
    pub async fn ask<R: Retriever, M: GenerativeModel>(
        &mut self,
        engine: &ChatEngine<R, M>,
        question: &str,
    ) -> ChatResult<ChatAnswer> {
        engine.ask(&mut self.chat, question).await
    }
}
