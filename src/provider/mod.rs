//! Record sources.
//!
//! A [`RecordSource`] delivers raw, source-shaped records for the corpus
//! builder. Sources do not normalize, filter by year or deduplicate; that is
//! the normalizer's and corpus store's job.
//!
//! - [`json::JsonFileSource`] reads an OpenAlex works dump from disk.
//! - [`openalex::OpenAlexSource`] pages through the OpenAlex works API.

use async_trait::async_trait;
use thiserror::Error;

use crate::normalizer::RawRecord;

pub mod json;
pub mod openalex;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to read records: {0}")]
    Io(#[from] std::io::Error),

    /// The payload is not a works list or page
    #[error("unreadable works payload: {0}")]
    Parse(String),

    /// HTTP 429 from the works API
    #[error("rate limited by the works API: {0}")]
    RateLimited(String),

    #[error("works API unreachable: {0}")]
    Network(String),

    #[error("works API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The search cannot be expressed as a query
    #[error("invalid works query: {0}")]
    InvalidQuery(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Callback told the running record count after each fetched batch.
pub type ProgressFn<'a> = &'a (dyn Fn(usize) + Send + Sync);

/// Anything that yields raw work records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch at most `limit` records in source order, calling `progress` with
    /// the running count.
    async fn fetch_records(&self, limit: usize, progress: ProgressFn<'_>) -> ProviderResult<Vec<RawRecord>>;

    fn name(&self) -> &str;
}

/// A progress callback that ignores updates.
pub fn no_progress(_count: usize) {}
