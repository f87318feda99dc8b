//! Local embedding provider backed by fastembed.
//!
//! Runs the embedding model in-process, so semantic retrieval works without
//! an API key. Enabled with the `fastembed` cargo feature.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

use super::{ensure_embeddable, single, EmbeddingError, EmbeddingProvider, EmbeddingResult};

pub const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::AllMiniLML6V2;

/// Output width of the models this crate is tested against; everything else
/// in the MiniLM/BGE-small family is 384.
fn dimension_of(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::BGEBaseENV15 | EmbeddingModel::NomicEmbedTextV15 => 768,
        EmbeddingModel::BGELargeENV15 => 1024,
        _ => 384,
    }
}

#[derive(Clone)]
pub struct FastEmbedProvider {
    // `TextEmbedding::embed` takes `&mut self`
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load `model` (default [`DEFAULT_MODEL`]), downloading its weights into
    /// `cache_dir` on first use.
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let model_name = format!("{model:?}");
        let dimension = dimension_of(&model);

        let options = match cache_dir {
            Some(dir) => InitOptions::new(model).with_cache_dir(dir),
            None => InitOptions::new(model),
        };
        let embedding = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::Model(format!("failed to load {model_name}: {e}")))?;
        info!(model = %model_name, dimension, "loaded local embedding model");

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name,
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        single(self.embed_batch(&[text]).await?)
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        ensure_embeddable(texts)?;

        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = self
            .model
            .lock()
            .await
            .embed(owned, None)
            .map_err(|e| EmbeddingError::Model(format!("{} failed to embed: {e}", self.model_name)))?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            });
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}
