//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Directory where downloaded model files are cached. `None` uses the
    /// fastembed default.
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Print a progress bar while fetching model files
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            batch_size: 16,
            normalize: true,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Default model with a custom cache directory
    pub fn default_with_path<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self::default().with_cache_dir(cache_dir)
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = Some(cache_dir.as_ref().to_path_buf());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Map the configured model name to a built-in fastembed model.
    ///
    /// Both the bare name and the `sentence-transformers/` or `BAAI/`
    /// qualified form are accepted, case-insensitively.
    pub fn fastembed_model(&self) -> Result<EmbeddingModel> {
        let name = self.model_name.to_ascii_lowercase();
        let short = name.rsplit('/').next().unwrap_or(&name);
        let model = match short {
            "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "snowflake-arctic-embed-xs" => EmbeddingModel::SnowflakeArcticEmbedXS,
            _ => {
                return Err(EmbedError::UnknownModel {
                    name: self.model_name.clone(),
                });
            }
        };
        Ok(model)
    }

    /// Vector dimension the configured model is known to produce.
    pub fn expected_dimension(&self) -> Result<usize> {
        let dimension = match self.fastembed_model()? {
            EmbeddingModel::AllMiniLML6V2
            | EmbeddingModel::AllMiniLML12V2
            | EmbeddingModel::BGESmallENV15
            | EmbeddingModel::SnowflakeArcticEmbedXS => 384,
            _ => {
                return Err(EmbedError::UnknownModel {
                    name: self.model_name.clone(),
                });
            }
        };
        Ok(dimension)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be positive"));
        }
        self.fastembed_model()?;
        Ok(())
    }
}
