//! JSON file provider.
//!
//! Reads a saved OpenAlex works listing: either a bare array of works or an
//! API page object with a `results` array.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::openalex::{Work, WorksPage};
use super::{ProgressFn, ProviderError, ProviderResult, RecordSource};
use crate::normalizer::RawRecord;

#[derive(Deserialize)]
#[serde(untagged)]
enum WorksFile {
    List(Vec<Work>),
    Page(WorksPage),
}

/// Record source backed by a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("json:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse works from JSON text.
pub fn parse_works(contents: &str) -> ProviderResult<Vec<Work>> {
    let file: WorksFile = serde_json::from_str(contents).map_err(|e| {
        ProviderError::Parse(format!(
            "expected an array of works or an object with 'results': {}",
            e
        ))
    })?;
    Ok(match file {
        WorksFile::List(works) => works,
        WorksFile::Page(page) => page.results,
    })
}

#[async_trait]
impl RecordSource for JsonFileSource {
    async fn fetch_records(&self, limit: usize, progress: ProgressFn<'_>) -> ProviderResult<Vec<RawRecord>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let records: Vec<RawRecord> = parse_works(&contents)?
            .into_iter()
            .take(limit)
            .map(RawRecord::from)
            .collect();

        progress(records.len());
        info!(path = %self.path.display(), records = records.len(), "loaded works file");
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
