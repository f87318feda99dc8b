//! Core data models shared across the corpus pipeline.
//!
//! This module contains the normalized paper schema produced by the record
//! normalizer, the author references it carries, and the ranked search result
//! type returned by the retrieval index.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Venue name used when a record carries no source information.
pub const UNKNOWN_VENUE: &str = "Unknown";

/// A single author reference attached to a paper.
///
/// Authors are identified by their source identifier; two authorships with the
/// same identifier on one paper collapse into a single `Author`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    /// Stable source identifier (e.g. an OpenAlex author URL)
    pub id: String,

    /// Display name of the author
    pub name: String,

    /// ISO alpha-2 country codes of the author's affiliations at publication time
    pub country_codes: BTreeSet<String>,
}

/// Publication type after mapping the source's type vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    JournalArticle,
    ConferencePaper,
    Book,
    BookChapter,
    Other,
}

impl DocumentType {
    /// Map a source type code onto the uniform vocabulary.
    ///
    /// Unrecognized codes map to [`DocumentType::Other`].
    pub fn from_source_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "article" | "journal-article" => DocumentType::JournalArticle,
            "proceedings-article" | "conference-paper" | "proceedings" => {
                DocumentType::ConferencePaper
            }
            "book" | "monograph" => DocumentType::Book,
            "book-chapter" => DocumentType::BookChapter,
            _ => DocumentType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::JournalArticle => "journal-article",
            DocumentType::ConferencePaper => "conference-paper",
            DocumentType::Book => "book",
            DocumentType::BookChapter => "book-chapter",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized research paper.
///
/// Produced by the record normalizer and held by the corpus store. The
/// publication year is guaranteed to lie within the filter range the corpus
/// was built with, and the document type is one the user opted into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Stable source identifier
    pub id: String,

    /// Paper title
    pub title: String,

    /// Decoded abstract text (empty when unavailable or undecodable)
    pub abstract_text: String,

    /// Year of publication
    pub publication_year: i32,

    /// Number of citations recorded by the source
    pub citation_count: u64,

    /// Uniform publication type
    pub document_type: DocumentType,

    /// Journal, proceedings or publisher name; [`UNKNOWN_VENUE`] when missing
    pub venue_name: String,

    /// Authors in byline order, deduplicated by identity
    pub authors: Vec<Author>,

    /// Full country names resolved from author affiliations
    pub countries: BTreeSet<String>,

    /// Affiliation institution names
    #[serde(default)]
    pub institutions: BTreeSet<String>,

    /// Concept keywords in source order
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Paper {
    /// Author display names in byline order.
    pub fn author_names(&self) -> impl Iterator<Item = &str> {
        self.authors.iter().map(|a| a.name.as_str())
    }
}

/// Inclusive publication-year range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearRange {
    /// Start year (inclusive)
    pub start: i32,

    /// End year (inclusive)
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Check if a year falls within this range.
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a question-answering conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// A paper ranked against a question, with its relevance score.
///
/// Scores are only comparable within the index that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched paper
    pub paper: Paper,

    /// Relevance score, higher is better
    pub score: f32,
}

impl SearchResult {
    pub fn new(paper: Paper, score: f32) -> Self {
        Self { paper, score }
    }
}
