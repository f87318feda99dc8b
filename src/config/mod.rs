//! Application configuration.
//!
//! Settings live in a TOML file (by default
//! `<config dir>/paper-insight/config.toml`). Every field has a default, so a
//! partial file or no file at all is valid; command-line flags override what
//! the file says.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::ChatConfig;
use crate::models::YearRange;
use crate::normalizer::FilterConfig;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Record source settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Years and document types to keep
    #[serde(default)]
    pub filter: FilterSettings,

    /// Index used to ground answers
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Generative model settings
    #[serde(default)]
    pub chat: ChatSettings,

    /// Export destination
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where and how many records to fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    /// Contact address sent as `mailto` for the polite pool
    #[serde(default)]
    pub email: Option<String>,

    /// Upper bound on records fetched and kept
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Works requested per page (at most 200)
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Works endpoint
    #[serde(default = "default_fetch_base_url")]
    pub base_url: String,
}

/// Inclusion filter, as the user states it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterSettings {
    /// First accepted publication year
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last accepted publication year
    #[serde(default = "default_end_year")]
    pub end_year: i32,

    /// Also keep conference papers
    #[serde(default)]
    pub include_conference: bool,

    /// Also keep books and book chapters
    #[serde(default)]
    pub include_books: bool,
}

/// Which retrieval index answers questions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
    #[default]
    Lexical,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    /// Lexical (BM25) or embedding index
    #[serde(default)]
    pub backend: RetrievalBackend,

    /// Papers retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding model for the semantic backend
    #[serde(default)]
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    /// Chat-completions model name
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// OpenAI-compatible API root
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    /// Character budget for the paper context in a prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Directory the CSV and JSON exports go to
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_max_records() -> usize {
    2000
}
fn default_per_page() -> usize {
    200
}
fn default_fetch_base_url() -> String {
    crate::provider::openalex::DEFAULT_BASE_URL.to_string()
}
fn default_start_year() -> i32 {
    2015
}
fn default_end_year() -> i32 {
    2025
}
fn default_top_k() -> usize {
    crate::chat::DEFAULT_TOP_K
}
fn default_chat_model() -> String {
    crate::generation::openai::DEFAULT_MODEL.to_string()
}
fn default_chat_base_url() -> String {
    crate::generation::openai::DEFAULT_BASE_URL.to_string()
}
fn default_max_context_chars() -> usize {
    crate::chat::DEFAULT_MAX_CONTEXT_CHARS
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            email: None,
            max_records: default_max_records(),
            per_page: default_per_page(),
            base_url: default_fetch_base_url(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: default_end_year(),
            include_conference: false,
            include_books: false,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            backend: RetrievalBackend::default(),
            top_k: default_top_k(),
            embedding_model: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            base_url: default_chat_base_url(),
            max_context_chars: default_max_context_chars(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

impl FilterSettings {
    pub fn year_range(&self) -> YearRange {
        YearRange::new(self.start_year, self.end_year)
    }

    pub fn to_filter(&self) -> FilterConfig {
        FilterConfig::from_flags(
            self.start_year,
            self.end_year,
            self.include_conference,
            self.include_books,
        )
    }
}

impl AppConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write configuration as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(io_err)?;
        Ok(())
    }

    /// Default config file location.
    pub fn default_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("paper-insight").join("config.toml"))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.filter.start_year > self.filter.end_year {
            return Err(ConfigError::Invalid(format!(
                "start year {} is after end year {}",
                self.filter.start_year, self.filter.end_year
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.fetch.max_records == 0 {
            return Err(ConfigError::Invalid("max_records must be at least 1".to_string()));
        }
        if self.fetch.per_page == 0 {
            return Err(ConfigError::Invalid("per_page must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            top_k: self.retrieval.top_k,
            max_context_chars: self.chat.max_context_chars,
        }
    }
}
