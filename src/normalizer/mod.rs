//! Record normalization.
//!
//! Turns raw, source-shaped records into the uniform [`Paper`] schema and
//! enforces the user's filter choices (year range, included document types).
//! Records that do not pass are returned as a classified [`RejectedRecord`]
//! rather than raised, so the corpus builder can count them.

pub mod countries;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::decoder::{decode_abstract, DecodeError, RawAbstract};
use crate::models::{Author, DocumentType, Paper, YearRange, UNKNOWN_VENUE};

/// One authorship entry of a raw record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawAuthorship {
    /// Source identifier of the author
    pub author_id: Option<String>,

    /// Display name of the author
    pub author_name: Option<String>,

    /// ISO alpha-2 codes of the affiliations listed on this authorship
    #[serde(default)]
    pub country_codes: Vec<String>,

    /// Affiliation institution names
    #[serde(default)]
    pub institutions: Vec<String>,
}

/// A record as delivered by the metadata source, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    /// Stable source identifier
    pub id: String,

    /// Title as given; trimmed, and empty when absent
    pub title: Option<String>,

    /// Inverted index, plain text, or absent
    pub raw_abstract: Option<RawAbstract>,

    /// Publication year; missing or zero is rejected
    pub publication_year: Option<i32>,

    /// Times cited; negative counts clamp to zero
    pub citation_count: Option<i64>,

    /// Source type code (e.g. `article`, `proceedings-article`)
    pub document_type: Option<String>,

    /// Journal, proceedings or publisher name; `"Unknown"` when absent
    pub venue_name: Option<String>,

    /// Authorships in byline order
    #[serde(default)]
    pub authorships: Vec<RawAuthorship>,

    /// Concept keywords in source order
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Inclusion filter applied while normalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Accepted publication years (inclusive)
    pub year_range: YearRange,

    /// Document types the user opted into
    pub allowed_types: BTreeSet<DocumentType>,
}

impl FilterConfig {
    /// Build a filter from the user's yes/no choices.
    ///
    /// Journal articles are always included; conference papers and
    /// books/chapters only when requested.
    pub fn from_flags(
        start_year: i32,
        end_year: i32,
        include_conference: bool,
        include_books: bool,
    ) -> Self {
        let mut allowed_types = BTreeSet::from([DocumentType::JournalArticle]);
        if include_conference {
            allowed_types.insert(DocumentType::ConferencePaper);
        }
        if include_books {
            allowed_types.insert(DocumentType::Book);
            allowed_types.insert(DocumentType::BookChapter);
        }
        Self {
            year_range: YearRange::new(start_year, end_year),
            allowed_types,
        }
    }

    pub fn allows(&self, document_type: DocumentType) -> bool {
        self.allowed_types.contains(&document_type)
    }
}

/// Why a record was excluded from the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Publication year outside the requested range
    OutOfRange,
    /// Document type the user did not opt into
    WrongType,
    /// Publication year absent or zero
    MissingYear,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::OutOfRange => "out_of_range",
            RejectionReason::WrongType => "wrong_type",
            RejectionReason::MissingYear => "missing_year",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that did not pass the filter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("record '{record_id}' rejected: {reason}")]
pub struct RejectedRecord {
    pub record_id: String,
    pub reason: RejectionReason,
}

/// A successfully normalized record plus the coverage it lost on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub paper: Paper,

    /// Affiliation country codes that had no entry in the lookup table
    pub unknown_country_codes: BTreeSet<String>,

    /// Diagnostics from abstract decoding
    pub decode_issues: Vec<DecodeError>,
}

/// Normalize one raw record against the active filter.
///
/// Checks run in a fixed order: missing year, year range, document type.
pub fn normalize(raw: &RawRecord, filter: &FilterConfig) -> Result<Normalized, RejectedRecord> {
    let reject = |reason| RejectedRecord {
        record_id: raw.id.clone(),
        reason,
    };

    let year = match raw.publication_year {
        Some(year) if year != 0 => year,
        _ => return Err(reject(RejectionReason::MissingYear)),
    };
    if !filter.year_range.contains(year) {
        return Err(reject(RejectionReason::OutOfRange));
    }

    let document_type = raw
        .document_type
        .as_deref()
        .map(DocumentType::from_source_code)
        .unwrap_or(DocumentType::Other);
    if !filter.allows(document_type) {
        return Err(reject(RejectionReason::WrongType));
    }

    let decoded = decode_abstract(raw.raw_abstract.as_ref());
    if !decoded.is_clean() {
        debug!(record = %raw.id, issues = decoded.issues.len(), "abstract decoded with diagnostics");
    }

    let authors = collect_authors(&raw.authorships);

    let mut countries = BTreeSet::new();
    let mut unknown_country_codes = BTreeSet::new();
    for code in authors.iter().flat_map(|a| a.country_codes.iter()) {
        match countries::country_name(code) {
            Some(name) => {
                countries.insert(name.to_string());
            }
            None => {
                debug!(record = %raw.id, code = %code, "dropping unknown country code");
                unknown_country_codes.insert(code.clone());
            }
        }
    }

    let institutions = raw
        .authorships
        .iter()
        .flat_map(|a| a.institutions.iter())
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let venue_name = raw
        .venue_name
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_VENUE)
        .to_string();

    let paper = Paper {
        id: raw.id.clone(),
        title: raw.title.as_deref().unwrap_or_default().trim().to_string(),
        abstract_text: decoded.text,
        publication_year: year,
        citation_count: raw.citation_count.unwrap_or(0).max(0) as u64,
        document_type,
        venue_name,
        authors,
        countries,
        institutions,
        keywords: raw.keywords.clone(),
    };

    Ok(Normalized {
        paper,
        unknown_country_codes,
        decode_issues: decoded.issues,
    })
}

/// Collapse authorships into authors, deduplicated by identity.
///
/// Authorships without an identifier fall back to the display name; entries
/// with neither are skipped. Repeated authorships merge their country codes.
fn collect_authors(authorships: &[RawAuthorship]) -> Vec<Author> {
    let mut authors: Vec<Author> = Vec::new();

    for authorship in authorships {
        let name = authorship.author_name.as_deref().map(str::trim).unwrap_or_default();
        let id = match authorship.author_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ if !name.is_empty() => name,
            _ => continue,
        };

        let codes = authorship
            .country_codes
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty());

        match authors.iter().position(|a| a.id == id) {
            Some(i) => authors[i].country_codes.extend(codes),
            None => authors.push(Author {
                id: id.to_string(),
                name: name.to_string(),
                country_codes: codes.collect(),
            }),
        }
    }

    authors
}
