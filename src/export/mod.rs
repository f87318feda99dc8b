//! Flat exports for spreadsheets and chart rendering.
//!
//! Papers are written one row per paper, multi-valued fields joined with
//! `"; "`. Aggregates are written as pretty JSON for whatever draws the
//! charts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::aggregation::AggregateStats;
use crate::corpus::CorpusStore;
use crate::models::Paper;

/// File name of the paper table inside the results directory.
pub const PAPERS_CSV: &str = "openalex_papers.csv";

/// File name of the aggregate statistics inside the results directory.
pub const STATS_JSON: &str = "aggregate_stats.json";

/// Separator for multi-valued fields.
pub const LIST_SEPARATOR: &str = "; ";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// One paper flattened to scalar columns.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaperRow {
    pub id: String,
    pub title: String,
    pub publication_year: i32,
    pub cited_by_count: u64,
    pub document_type: String,
    pub source_name: String,
    pub authors: String,
    pub institutions: String,
    pub countries: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: String,
}

impl From<&Paper> for PaperRow {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            publication_year: paper.publication_year,
            cited_by_count: paper.citation_count,
            document_type: paper.document_type.to_string(),
            source_name: paper.venue_name.clone(),
            authors: join(paper.author_names()),
            institutions: join(paper.institutions.iter().map(String::as_str)),
            countries: join(paper.countries.iter().map(String::as_str)),
            abstract_text: paper.abstract_text.clone(),
            keywords: join(paper.keywords.iter().map(String::as_str)),
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(LIST_SEPARATOR)
}

/// Write the corpus as CSV.
pub fn write_papers_csv(corpus: &CorpusStore, path: &Path) -> ExportResult<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for paper in corpus {
        writer.serialize(PaperRow::from(paper))?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = corpus.len(), "wrote paper table");
    Ok(())
}

/// Write aggregate statistics as pretty JSON.
pub fn write_stats_json(stats: &AggregateStats, path: &Path) -> ExportResult<()> {
    ensure_parent(path)?;
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, stats)?;
    info!(path = %path.display(), "wrote aggregate statistics");
    Ok(())
}

/// Write both exports into `dir`, returning the paths written.
pub fn export_all(corpus: &CorpusStore, stats: &AggregateStats, dir: &Path) -> ExportResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let csv_path = dir.join(PAPERS_CSV);
    let json_path = dir.join(STATS_JSON);
    write_papers_csv(corpus, &csv_path)?;
    write_stats_json(stats, &json_path)?;
    Ok((csv_path, json_path))
}

fn ensure_parent(path: &Path) -> ExportResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, DocumentType};
    use std::collections::BTreeSet;

    fn sample_paper() -> Paper {
        Paper {
            id: "W1".to_string(),
            title: "Graphs, \"quoted\"".to_string(),
            abstract_text: "Line one\nline two".to_string(),
            publication_year: 2021,
            citation_count: 4,
            document_type: DocumentType::ConferencePaper,
            venue_name: "Proc. Graphs".to_string(),
            authors: vec![
                Author {
                    id: "A1".to_string(),
                    name: "Ada".to_string(),
                    country_codes: BTreeSet::new(),
                },
                Author {
                    id: "A2".to_string(),
                    name: "Grace".to_string(),
                    country_codes: BTreeSet::new(),
                },
            ],
            countries: BTreeSet::from(["France".to_string(), "Japan".to_string()]),
            institutions: BTreeSet::from(["Univ A".to_string()]),
            keywords: vec!["Graph theory".to_string(), "Algorithms".to_string()],
        }
    }

    #[test]
    fn test_paper_row_joins_lists() {
        let row = PaperRow::from(&sample_paper());
        assert_eq!(row.authors, "Ada; Grace");
        assert_eq!(row.countries, "France; Japan");
        assert_eq!(row.institutions, "Univ A");
        assert_eq!(row.keywords, "Graph theory; Algorithms");
        assert_eq!(row.document_type, "conference-paper");
        assert_eq!(row.source_name, "Proc. Graphs");
    }

    #[test]
    fn test_write_papers_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(PAPERS_CSV);
        let corpus = CorpusStore::from_papers(vec![sample_paper()]);

        write_papers_csv(&corpus, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            headers,
            vec![
                "id",
                "title",
                "publication_year",
                "cited_by_count",
                "document_type",
                "source_name",
                "authors",
                "institutions",
                "countries",
                "abstract",
                "keywords"
            ]
        );
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][1], "Graphs, \"quoted\"");
        assert_eq!(&records[0][9], "Line one\nline two");
    }

    #[test]
    fn test_export_all_writes_stats() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = CorpusStore::from_papers(vec![sample_paper()]);
        let stats = AggregateStats::compute(&corpus);

        let (csv_path, json_path) = export_all(&corpus, &stats, &dir.path().join("results")).unwrap();

        assert!(csv_path.exists());
        let parsed: AggregateStats = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(parsed, stats);
    }
}
