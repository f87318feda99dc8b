//! OpenAlex works API.
//!
//! The serde types here mirror the subset of the OpenAlex `Work` object the
//! corpus needs; they are shared with [`super::json::JsonFileSource`], which
//! reads the same shape from disk.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ProgressFn, ProviderError, ProviderResult, RecordSource};
use crate::decoder::RawAbstract;
use crate::models::DocumentType;
use crate::normalizer::{FilterConfig, RawAuthorship, RawRecord};

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org/works";

/// Largest page the API serves.
pub const MAX_PER_PAGE: usize = 200;

/// Cursor that starts a cursor-paged listing.
pub const FIRST_CURSOR: &str = "*";

/// One page of a works listing.
#[derive(Debug, Deserialize)]
pub struct WorksPage {
    pub results: Vec<Work>,
    pub meta: Option<WorksMeta>,
}

#[derive(Debug, Deserialize)]
pub struct WorksMeta {
    pub count: Option<u64>,
    pub next_cursor: Option<String>,
}

/// An OpenAlex work.
#[derive(Debug, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_year: Option<i32>,
    pub cited_by_count: Option<i64>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub primary_location: Option<Location>,
    pub authorships: Option<Vec<Authorship>>,
    pub abstract_inverted_index: Option<RawAbstract>,
    pub concepts: Option<Vec<Concept>>,
}

#[derive(Debug, Deserialize)]
pub struct Location {
    pub source: Option<Source>,
}

#[derive(Debug, Deserialize)]
pub struct Source {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Authorship {
    pub author: Option<AuthorRef>,
    pub institutions: Option<Vec<Institution>>,
    /// Country codes OpenAlex attaches to the authorship directly
    pub countries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Institution {
    pub display_name: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Concept {
    pub display_name: Option<String>,
}

impl From<Authorship> for RawAuthorship {
    fn from(authorship: Authorship) -> Self {
        let (author_id, author_name) = match authorship.author {
            Some(author) => (author.id, author.display_name),
            None => (None, None),
        };

        let mut country_codes = Vec::new();
        let mut institutions = Vec::new();
        for institution in authorship.institutions.unwrap_or_default() {
            if let Some(name) = institution.display_name {
                institutions.push(name);
            }
            if let Some(code) = institution.country_code {
                country_codes.push(code);
            }
        }
        for code in authorship.countries.unwrap_or_default() {
            if !country_codes.contains(&code) {
                country_codes.push(code);
            }
        }

        RawAuthorship {
            author_id,
            author_name,
            country_codes,
            institutions,
        }
    }
}

impl From<Work> for RawRecord {
    fn from(work: Work) -> Self {
        let venue_name = work
            .primary_location
            .and_then(|location| location.source)
            .and_then(|source| source.display_name);

        RawRecord {
            id: work.id,
            title: work.title.or(work.display_name),
            raw_abstract: work.abstract_inverted_index,
            publication_year: work.publication_year,
            citation_count: work.cited_by_count,
            document_type: work.work_type,
            venue_name,
            authorships: work
                .authorships
                .unwrap_or_default()
                .into_iter()
                .map(RawAuthorship::from)
                .collect(),
            keywords: work
                .concepts
                .unwrap_or_default()
                .into_iter()
                .filter_map(|concept| concept.display_name)
                .collect(),
        }
    }
}

/// OpenAlex type code requested for a document type, if any.
fn openalex_type(document_type: DocumentType) -> Option<&'static str> {
    match document_type {
        DocumentType::JournalArticle => Some("article"),
        DocumentType::ConferencePaper => Some("proceedings-article"),
        DocumentType::Book => Some("book"),
        DocumentType::BookChapter => Some("book-chapter"),
        DocumentType::Other => None,
    }
}

/// Render the `filter` parameter for a filter configuration.
pub fn filter_param(filter: &FilterConfig) -> String {
    let mut param = format!("publication_year:{}", filter.year_range);
    let types: Vec<&str> = filter
        .allowed_types
        .iter()
        .filter_map(|t| openalex_type(*t))
        .collect();
    if !types.is_empty() {
        param.push_str(",type:");
        param.push_str(&types.join("|"));
    }
    param
}

/// Cursor-paged keyword search against the works endpoint.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: reqwest::Client,
    base_url: String,
    search: String,
    filter: FilterConfig,
    per_page: usize,
    mailto: Option<String>,
}

impl OpenAlexSource {
    /// Create a source searching for `keywords` within `filter`.
    ///
    /// # Errors
    /// Returns [`ProviderError::InvalidQuery`] for empty keywords.
    pub fn new(keywords: impl Into<String>, filter: FilterConfig) -> ProviderResult<Self> {
        let search = keywords.into().trim().to_string();
        if search.is_empty() {
            return Err(ProviderError::InvalidQuery("search keywords are empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            search,
            filter,
            per_page: MAX_PER_PAGE,
            mailto: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Page size, clamped to what the API accepts.
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    /// Contact address for the polite pool.
    pub fn with_mailto(mut self, email: Option<String>) -> Self {
        self.mailto = email.filter(|e| !e.trim().is_empty());
        self
    }

    fn query_params(&self, cursor: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("search", self.search.clone()),
            ("filter", filter_param(&self.filter)),
            ("per_page", self.per_page.to_string()),
            ("cursor", cursor.to_string()),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        params
    }

}

/// One request against a cursor-paged works listing.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page at `cursor`; the first page is `"*"`.
    async fn fetch_page(&self, cursor: &str) -> ProviderResult<WorksPage>;
}

#[async_trait]
impl PageFetcher for OpenAlexSource {
    async fn fetch_page(&self, cursor: &str) -> ProviderResult<WorksPage> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(cursor))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(body));
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// Walk a cursor-paged listing until the results run out, the cursor ends,
/// or `limit` records have been collected; the last page is cut to the limit.
///
/// # Errors
/// An error on the first page is returned. A later failure ends paging early
/// and keeps what was collected.
pub async fn collect_pages(
    fetcher: &dyn PageFetcher,
    limit: usize,
    progress: ProgressFn<'_>,
) -> ProviderResult<Vec<RawRecord>> {
    let mut records: Vec<RawRecord> = Vec::new();
    let mut cursor = FIRST_CURSOR.to_string();
    let mut pages = 0usize;

    while records.len() < limit {
        let page = match fetcher.fetch_page(&cursor).await {
            Ok(page) => page,
            Err(e) if pages == 0 => return Err(e),
            Err(e) => {
                warn!(error = %e, pages, fetched = records.len(), "fetch interrupted, keeping partial results");
                break;
            }
        };
        pages += 1;
        if page.results.is_empty() {
            break;
        }

        let remaining = limit - records.len();
        records.extend(page.results.into_iter().take(remaining).map(RawRecord::from));
        progress(records.len());
        debug!(page = pages, fetched = records.len(), "fetched page");

        match page.meta.and_then(|meta| meta.next_cursor) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(records)
}

#[async_trait]
impl RecordSource for OpenAlexSource {
    async fn fetch_records(&self, limit: usize, progress: ProgressFn<'_>) -> ProviderResult<Vec<RawRecord>> {
        info!(search = %self.search, filter = %filter_param(&self.filter), "fetching from OpenAlex");
        let records = collect_pages(self, limit, progress).await?;
        info!(fetched = records.len(), "fetch complete");
        Ok(records)
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::no_progress;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WORK_JSON: &str = r#"{
        "id": "https://openalex.org/W1",
        "title": "Graph Learning",
        "publication_year": 2021,
        "cited_by_count": 12,
        "type": "article",
        "primary_location": {"source": {"display_name": "Journal of Graphs"}},
        "authorships": [
            {
                "author": {"id": "https://openalex.org/A1", "display_name": "Ada Lovelace"},
                "institutions": [
                    {"display_name": "Univ A", "country_code": "GB"},
                    {"display_name": "Univ B", "country_code": "US"}
                ],
                "countries": ["GB"]
            },
            {"author": {"id": null, "display_name": "Anon"}, "institutions": null}
        ],
        "abstract_inverted_index": {"graphs": [0], "matter": [1]},
        "concepts": [{"display_name": "Graph theory"}, {"display_name": null}]
    }"#;

    #[test]
    fn test_work_to_raw_record() {
        let work: Work = serde_json::from_str(WORK_JSON).unwrap();
        let record = RawRecord::from(work);

        assert_eq!(record.id, "https://openalex.org/W1");
        assert_eq!(record.title.as_deref(), Some("Graph Learning"));
        assert_eq!(record.venue_name.as_deref(), Some("Journal of Graphs"));
        assert_eq!(record.document_type.as_deref(), Some("article"));
        assert_eq!(record.citation_count, Some(12));
        assert_eq!(record.keywords, vec!["Graph theory"]);
        assert!(matches!(record.raw_abstract, Some(RawAbstract::InvertedIndex(_))));

        assert_eq!(record.authorships.len(), 2);
        assert_eq!(record.authorships[0].country_codes, vec!["GB", "US"]);
        assert_eq!(record.authorships[0].institutions, vec!["Univ A", "Univ B"]);
        assert_eq!(record.authorships[1].author_name.as_deref(), Some("Anon"));
        assert!(record.authorships[1].country_codes.is_empty());
    }

    #[test]
    fn test_sparse_work() {
        let work: Work = serde_json::from_str(
            r#"{"id": "W9", "display_name": "Only a name", "primary_location": null,
                "abstract_inverted_index": null}"#,
        )
        .unwrap();
        let record = RawRecord::from(work);

        assert_eq!(record.title.as_deref(), Some("Only a name"));
        assert!(record.venue_name.is_none());
        assert!(record.raw_abstract.is_none());
        assert!(record.publication_year.is_none());
        assert!(record.authorships.is_empty());
    }

    #[test]
    fn test_filter_param() {
        let articles_only = FilterConfig::from_flags(2020, 2023, false, false);
        assert_eq!(filter_param(&articles_only), "publication_year:2020-2023,type:article");

        let everything = FilterConfig::from_flags(2018, 2024, true, true);
        assert_eq!(
            filter_param(&everything),
            "publication_year:2018-2024,type:article|proceedings-article|book|book-chapter"
        );
    }

    #[test]
    fn test_query_params() {
        let source = OpenAlexSource::new(" generative ai ", FilterConfig::from_flags(2020, 2021, true, false))
            .unwrap()
            .with_per_page(500)
            .with_mailto(Some("me@example.org".to_string()));
        let params = source.query_params("*");

        assert!(params.contains(&("search", "generative ai".to_string())));
        assert!(params.contains(&("per_page", "200".to_string())));
        assert!(params.contains(&("cursor", "*".to_string())));
        assert!(params.contains(&("mailto", "me@example.org".to_string())));
        assert!(params.contains(&(
            "filter",
            "publication_year:2020-2021,type:article|proceedings-article".to_string()
        )));
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let result = OpenAlexSource::new("   ", FilterConfig::from_flags(2020, 2021, false, false));
        assert!(matches!(result, Err(ProviderError::InvalidQuery(_))));
    }

    #[test]
    fn test_works_page_parses() {
        let page: WorksPage = serde_json::from_str(&format!(
            r#"{{"meta": {{"count": 1, "next_cursor": "abc"}}, "results": [{}]}}"#,
            WORK_JSON
        ))
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.meta.unwrap().next_cursor.as_deref(), Some("abc"));
    }

    struct ScriptedPages {
        pages: Mutex<VecDeque<ProviderResult<WorksPage>>>,
        cursors: Mutex<Vec<String>>,
    }

    impl ScriptedPages {
        fn new(pages: Vec<ProviderResult<WorksPage>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                cursors: Mutex::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<String> {
            self.cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedPages {
        async fn fetch_page(&self, cursor: &str) -> ProviderResult<WorksPage> {
            self.cursors.lock().unwrap().push(cursor.to_string());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("no page scripted for cursor {cursor}"))
        }
    }

    fn page(ids: &[&str], next_cursor: Option<&str>) -> ProviderResult<WorksPage> {
        let results: Vec<serde_json::Value> = ids.iter().map(|id| serde_json::json!({ "id": id })).collect();
        Ok(serde_json::from_value(serde_json::json!({
            "results": results,
            "meta": {"next_cursor": next_cursor}
        }))
        .unwrap())
    }

    fn ids(records: &[RawRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_paging_follows_cursor_until_it_ends() {
        let fetcher = ScriptedPages::new(vec![page(&["W1", "W2"], Some("c2")), page(&["W3"], None)]);

        let records = collect_pages(&fetcher, 10, &no_progress).await.unwrap();

        assert_eq!(ids(&records), vec!["W1", "W2", "W3"]);
        assert_eq!(fetcher.cursors(), vec![FIRST_CURSOR, "c2"]);
    }

    #[tokio::test]
    async fn test_paging_stops_on_empty_page() {
        let fetcher = ScriptedPages::new(vec![page(&["W1"], Some("c2")), page(&[], Some("c3"))]);

        let records = collect_pages(&fetcher, 10, &no_progress).await.unwrap();

        assert_eq!(ids(&records), vec!["W1"]);
        assert_eq!(fetcher.cursors().len(), 2);
    }

    #[tokio::test]
    async fn test_paging_cuts_last_page_to_limit() {
        let fetcher = ScriptedPages::new(vec![
            page(&["W1", "W2"], Some("c2")),
            page(&["W3", "W4"], Some("c3")),
            page(&["W5"], None),
        ]);
        let seen = AtomicUsize::new(0);
        let progress = |n: usize| seen.store(n, Ordering::SeqCst);

        let records = collect_pages(&fetcher, 3, &progress).await.unwrap();

        assert_eq!(ids(&records), vec!["W1", "W2", "W3"]);
        assert_eq!(fetcher.cursors().len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_paging_first_page_error_fails() {
        let fetcher = ScriptedPages::new(vec![Err(ProviderError::RateLimited("slow down".to_string()))]);

        let result = collect_pages(&fetcher, 10, &no_progress).await;

        assert!(matches!(result, Err(ProviderError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_paging_later_error_keeps_partial_results() {
        let fetcher = ScriptedPages::new(vec![
            page(&["W1", "W2"], Some("c2")),
            Err(ProviderError::Network("connection reset".to_string())),
        ]);

        let records = collect_pages(&fetcher, 10, &no_progress).await.unwrap();

        assert_eq!(ids(&records), vec!["W1", "W2"]);
    }

    #[tokio::test]
    async fn test_paging_zero_limit_sends_no_request() {
        let fetcher = ScriptedPages::new(vec![]);

        let records = collect_pages(&fetcher, 0, &no_progress).await.unwrap();

        assert!(records.is_empty());
        assert!(fetcher.cursors().is_empty());
    }
}
