//! Paper Insight - bibliometric analysis and question answering over scholarly records.
//!
//! This library turns OpenAlex-style work records into a normalized corpus,
//! computes corpus-level bibliometric aggregates, and answers free-form
//! questions about the corpus by retrieving relevant papers and grounding a
//! generative model in them.
//!
//! # Modules
//!
//! - **decoder**: Reconstructs abstracts from positional inverted indexes
//! - **normalizer**: Maps raw records onto the uniform [`Paper`] schema and applies filters
//! - **corpus**: Ordered, deduplicated in-memory paper collection
//! - **aggregation**: Yearly, country, author and venue statistics
//! - **retrieval**: BM25 and embedding-based ranking of papers for a question
//! - **chat**: Retrieval-grounded question answering with conversation history
//! - **provider**: Record sources (OpenAlex API, JSON dumps)
//! - **embedding** / **generation**: Model boundaries over OpenAI-compatible APIs
//! - **export**: CSV and JSON output
//! - **config** / **session**: Per-run settings and state
//!
//! # Pipeline
//!
//! Records come from a [`provider::RecordSource`]. Each one has its abstract
//! decoded and its metadata normalized; records outside the configured years
//! or document types are rejected. The accepted papers form a
//! [`CorpusStore`], from which [`AggregateStats`] are computed once. A
//! [`Retriever`] built over the same corpus feeds the [`ChatEngine`], which
//! prompts the model with the top-ranked papers for every question.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use paper_insight::{
//!     config::AppConfig,
//!     generation::openai::OpenAiChatModel,
//!     provider::{json::JsonFileSource, no_progress},
//!     session::Session,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::default();
//!     let source = JsonFileSource::new("works.json");
//!     let mut session = Session::load(config, &source, &no_progress).await?;
//!
//!     for (country, papers) in session.stats().top_countries(10) {
//!         println!("{country}: {papers}");
//!     }
//!
//!     let model = OpenAiChatModel::new(std::env::var("OPENAI_API_KEY").ok(), None, Duration::from_secs(60))?;
//!     let engine = session.chat_engine(session.lexical_index()?, model);
//!     let answer = session.ask(&engine, "Which methods dominate after 2020?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod chat;
pub mod config;
pub mod corpus;
pub mod decoder;
pub mod embedding;
pub mod export;
pub mod generation;
pub mod models;
pub mod normalizer;
pub mod provider;
pub mod retrieval;
pub mod session;

pub use aggregation::AggregateStats;
pub use chat::{ChatAnswer, ChatEngine, ChatSession};
pub use config::AppConfig;
pub use corpus::CorpusStore;
pub use embedding::EmbeddingProvider;
pub use generation::GenerativeModel;
pub use models::{Author, DocumentType, Paper, SearchResult, YearRange};
pub use normalizer::{FilterConfig, RawRecord};
pub use retrieval::Retriever;
pub use session::Session;

/// Crate version, shown by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
