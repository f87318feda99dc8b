//! Bibliometric aggregation over a corpus.
//!
//! [`AggregateStats::compute`] is a pure function of the corpus: all maps are
//! ordered, so repeated calls on the same store produce identical output, and
//! ranked views break count ties by ascending name.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::corpus::CorpusStore;

/// Number of countries shown in the country×year matrix.
pub const MATRIX_COUNTRIES: usize = 10;

/// One paper's position on the citations-vs-year plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationPoint {
    pub year: i32,
    pub citation_count: u64,
    pub title: String,
}

/// Paper counts for the top countries across every corpus year.
///
/// `cells[i][j]` is the count for `countries[i]` in `years[j]`; cells without
/// observations hold zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryYearMatrix {
    /// Countries in rank order (descending total, ties by name)
    pub countries: Vec<String>,

    /// Corpus years, ascending
    pub years: Vec<i32>,

    pub cells: Vec<Vec<usize>>,
}

impl CountryYearMatrix {
    /// Count for a (country, year) cell, `None` if either lies outside the matrix.
    pub fn get(&self, country: &str, year: i32) -> Option<usize> {
        let row = self.countries.iter().position(|c| c == country)?;
        let col = self.years.binary_search(&year).ok()?;
        Some(self.cells[row][col])
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() || self.years.is_empty()
    }
}

/// Derived statistics for one corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_papers: usize,

    pub total_citations: u64,

    /// Papers per publication year
    pub yearly_counts: BTreeMap<i32, usize>,

    /// Papers with at least one affiliation in each country
    pub country_counts: BTreeMap<String, usize>,

    /// Papers per author display name
    pub author_counts: BTreeMap<String, usize>,

    /// Papers per venue
    pub venue_counts: BTreeMap<String, usize>,

    /// One entry per paper in corpus order, zero-citation papers included
    pub citation_series: Vec<CitationPoint>,

    pub country_year: CountryYearMatrix,
}

impl AggregateStats {
    /// Compute every aggregate in a single pass over the corpus.
    pub fn compute(corpus: &CorpusStore) -> Self {
        let mut stats = AggregateStats {
            total_papers: corpus.len(),
            ..Default::default()
        };
        let mut country_year: BTreeMap<(String, i32), usize> = BTreeMap::new();

        for paper in corpus {
            let year = paper.publication_year;
            stats.total_citations += paper.citation_count;
            *stats.yearly_counts.entry(year).or_default() += 1;
            *stats.venue_counts.entry(paper.venue_name.clone()).or_default() += 1;

            for country in &paper.countries {
                *stats.country_counts.entry(country.clone()).or_default() += 1;
                *country_year.entry((country.clone(), year)).or_default() += 1;
            }

            let names: BTreeSet<&str> = paper
                .author_names()
                .filter(|name| !name.is_empty())
                .collect();
            for name in names {
                *stats.author_counts.entry(name.to_string()).or_default() += 1;
            }

            stats.citation_series.push(CitationPoint {
                year,
                citation_count: paper.citation_count,
                title: paper.title.clone(),
            });
        }

        let countries: Vec<String> = top_n(&stats.country_counts, MATRIX_COUNTRIES)
            .into_iter()
            .map(|(country, _)| country)
            .collect();
        let years: Vec<i32> = stats.yearly_counts.keys().copied().collect();
        let cells = countries
            .iter()
            .map(|country| {
                years
                    .iter()
                    .map(|&year| {
                        country_year
                            .get(&(country.clone(), year))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect()
            })
            .collect();
        stats.country_year = CountryYearMatrix {
            countries,
            years,
            cells,
        };

        stats
    }

    pub fn top_countries(&self, n: usize) -> Vec<(String, usize)> {
        top_n(&self.country_counts, n)
    }

    pub fn top_authors(&self, n: usize) -> Vec<(String, usize)> {
        top_n(&self.author_counts, n)
    }

    pub fn top_venues(&self, n: usize) -> Vec<(String, usize)> {
        top_n(&self.venue_counts, n)
    }
}

/// The `n` highest counts, descending, ties broken by ascending name.
pub fn top_n(counts: &BTreeMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(name, count)| (name.clone(), *count))
        .collect()
}
