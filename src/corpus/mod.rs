//! Corpus store.
//!
//! The corpus is the ordered, deduplicated set of normalized papers for one
//! session. It is built once from a bounded number of raw records and is
//! immutable afterwards; downstream consumers (aggregation, retrieval, export)
//! only ever read it.
//!
//! # Usage
//!
//! ```
//! use paper_insight::corpus::CorpusStore;
//! use paper_insight::normalizer::{FilterConfig, RawRecord};
//!
//! let records = vec![RawRecord {
//!     id: "W1".to_string(),
//!     publication_year: Some(2021),
//!     document_type: Some("article".to_string()),
//!     ..Default::default()
//! }];
//! let filter = FilterConfig::from_flags(2020, 2022, false, false);
//!
//! let (corpus, stats) = CorpusStore::build(records, &filter, 2000);
//! assert_eq!(corpus.len(), 1);
//! assert_eq!(stats.accepted, 1);
//! ```

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::models::Paper;
use crate::normalizer::{normalize, FilterConfig, RawRecord, RejectionReason};

/// Statistics from one corpus build.
///
/// Tracks what happened to every raw record that was considered, so rejected
/// records are counted rather than raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizationStats {
    /// Total number of raw records considered
    pub total_processed: usize,

    /// Records that became papers in the corpus
    pub accepted: usize,

    /// Records skipped because a paper with the same identifier was already accepted
    pub duplicates_skipped: usize,

    /// Records rejected by the filter, per reason
    pub rejected: BTreeMap<RejectionReason, usize>,

    /// Accepted records whose abstract decoded with diagnostics
    pub decode_diagnostics: usize,

    /// Affiliation country codes missing from the lookup table, with occurrence counts
    pub unknown_country_codes: BTreeMap<String, usize>,
}

impl NormalizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a paper accepted into the corpus.
    pub fn record_accepted(&mut self) {
        self.total_processed += 1;
        self.accepted += 1;
    }

    /// Record a duplicate that was skipped.
    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    /// Record a filter rejection.
    pub fn record_rejected(&mut self, reason: RejectionReason) {
        self.total_processed += 1;
        *self.rejected.entry(reason).or_default() += 1;
    }

    /// Number of records rejected for a given reason.
    pub fn rejected_for(&self, reason: RejectionReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// In-memory ordered collection of normalized papers.
#[derive(Debug, Clone, Default)]
pub struct CorpusStore {
    papers: Vec<Paper>,
    filter: Option<FilterConfig>,
}

impl CorpusStore {
    /// Build a corpus from raw records.
    ///
    /// At most `max_records` raw records are considered. Papers keep the order
    /// in which their records arrived; a repeated identifier keeps the first
    /// occurrence.
    pub fn build<I>(records: I, filter: &FilterConfig, max_records: usize) -> (Self, NormalizationStats)
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut stats = NormalizationStats::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut papers = Vec::new();

        for raw in records.into_iter().take(max_records) {
            if seen.contains(&raw.id) {
                debug!(record = %raw.id, "skipping duplicate record");
                stats.record_duplicate();
                continue;
            }

            match normalize(&raw, filter) {
                Ok(normalized) => {
                    for code in normalized.unknown_country_codes {
                        *stats.unknown_country_codes.entry(code).or_default() += 1;
                    }
                    if !normalized.decode_issues.is_empty() {
                        stats.decode_diagnostics += 1;
                    }
                    seen.insert(normalized.paper.id.clone());
                    papers.push(normalized.paper);
                    stats.record_accepted();
                }
                Err(rejection) => {
                    debug!(record = %rejection.record_id, reason = %rejection.reason, "record rejected");
                    stats.record_rejected(rejection.reason);
                }
            }
        }

        info!(
            accepted = stats.accepted,
            rejected = stats.total_rejected(),
            duplicates = stats.duplicates_skipped,
            "corpus built"
        );
        if !stats.unknown_country_codes.is_empty() {
            warn!(
                codes = stats.unknown_country_codes.len(),
                "some affiliation country codes could not be resolved"
            );
        }

        let store = Self {
            papers,
            filter: Some(filter.clone()),
        };
        (store, stats)
    }

    /// Wrap already-normalized papers, deduplicating by identifier.
    pub fn from_papers(papers: Vec<Paper>) -> Self {
        let mut seen = HashSet::new();
        let papers = papers
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
        Self { papers, filter: None }
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Paper> {
        self.papers.iter()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Look up a paper by its source identifier.
    pub fn get(&self, id: &str) -> Option<&Paper> {
        self.papers.iter().find(|p| p.id == id)
    }

    /// The filter this corpus was built with, if it was built from raw records.
    pub fn filter(&self) -> Option<&FilterConfig> {
        self.filter.as_ref()
    }
}

impl<'a> IntoIterator for &'a CorpusStore {
    type Item = &'a Paper;
    type IntoIter = std::slice::Iter<'a, Paper>;

    fn into_iter(self) -> Self::IntoIter {
        self.papers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::RawAuthorship;

    fn record(id: &str, year: i32, doc_type: &str) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            title: Some(format!("Paper {}", id)),
            publication_year: Some(year),
            citation_count: Some(1),
            document_type: Some(doc_type.to_string()),
            authorships: vec![RawAuthorship {
                author_id: Some("A1".to_string()),
                author_name: Some("Ada".to_string()),
                country_codes: vec!["US".to_string(), "ZZ".to_string()],
                institutions: vec![],
            }],
            ..Default::default()
        }
    }

    fn filter() -> FilterConfig {
        FilterConfig::from_flags(2020, 2022, false, false)
    }

    #[test]
    fn test_build_keeps_order_and_counts_outcomes() {
        let records = vec![
            record("W1", 2020, "article"),
            record("W2", 2019, "article"),
            record("W3", 2021, "book-chapter"),
            record("W4", 2022, "article"),
            record("W1", 2021, "article"),
        ];
        let (corpus, stats) = CorpusStore::build(records, &filter(), 100);

        let ids: Vec<&str> = corpus.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["W1", "W4"]);
        assert_eq!(stats.total_processed, 5);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(stats.rejected_for(RejectionReason::OutOfRange), 1);
        assert_eq!(stats.rejected_for(RejectionReason::WrongType), 1);
        assert_eq!(stats.rejected_for(RejectionReason::MissingYear), 0);
        assert_eq!(stats.unknown_country_codes.get("ZZ"), Some(&2));
    }

    #[test]
    fn test_wrong_type_record_not_in_store() {
        let (corpus, stats) = CorpusStore::build(vec![record("W9", 2021, "book-chapter")], &filter(), 10);
        assert!(corpus.is_empty());
        assert!(corpus.get("W9").is_none());
        assert_eq!(stats.rejected_for(RejectionReason::WrongType), 1);
    }

    #[test]
    fn test_build_respects_record_limit() {
        let records = (0..10).map(|i| record(&format!("W{}", i), 2021, "article"));
        let (corpus, stats) = CorpusStore::build(records, &filter(), 3);
        assert_eq!(corpus.len(), 3);
        assert_eq!(stats.total_processed, 3);
    }

    #[test]
    fn test_empty_input_builds_empty_corpus() {
        let (corpus, stats) = CorpusStore::build(Vec::new(), &filter(), 10);
        assert!(corpus.is_empty());
        assert_eq!(stats, NormalizationStats::new());
        assert_eq!(corpus.filter(), Some(&filter()));
    }

    #[test]
    fn test_rejected_duplicate_can_still_be_accepted_later() {
        let records = vec![record("W1", 2010, "article"), record("W1", 2021, "article")];
        let (corpus, stats) = CorpusStore::build(records, &filter(), 10);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.papers()[0].publication_year, 2021);
        assert_eq!(stats.duplicates_skipped, 0);
    }
}
