//! Pipeline configuration.
//!
//! Settings are read from a TOML file, every section optional:
//!
//! ```toml
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! backend = "fastembed"        # or "hash" for offline use
//! model_name = "sentence-transformers/all-MiniLM-L6-v2"
//! dimension = 384
//!
//! [generator]
//! endpoint = "http://localhost:11434"
//! model = "qwen3-coder:480b-cloud"
//! temperature = 0.7
//!
//! [index]
//! path = "docqa-index.db"
//! replace_on_reingest = false
//!
//! [retrieval]
//! top_k = 3
//! ```

use crate::error::{PipelineError, Result};
use docqa_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generator: GeneratorConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX model through FastEmbed
    Fastembed,
    /// Deterministic feature hashing, no model download
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Vector length; must agree with the model and with an existing index
    pub dimension: usize,
    /// Upper bound on a single embedding call
    pub timeout_secs: f64,
    #[serde(flatten)]
    pub model: EmbedConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Fastembed,
            dimension: 384,
            timeout_secs: 120.0,
            model: EmbedConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL of the Ollama server
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on one generation request
    pub timeout_secs: f64,
    /// Upper bound on the liveness probe
    pub probe_timeout_secs: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen3-coder:480b-cloud".to_string(),
            temperature: 0.7,
            timeout_secs: 120.0,
            probe_timeout_secs: 5.0,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// SQLite file holding the vector index
    pub path: PathBuf,
    /// Drop records with the same content hash before adding a document again
    pub replace_on_reingest: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docqa-index.db"),
            replace_on_reingest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the generator
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl PipelineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::config(format!("invalid TOML: {e}")))
    }

    /// Load a configuration file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check every constraint that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(PipelineError::config("chunk_size must be greater than 0"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(PipelineError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }

        let embedding = &self.embedding;
        if embedding.dimension == 0 {
            return Err(PipelineError::config("embedding dimension must be greater than 0"));
        }
        if embedding.backend == EmbeddingBackend::Fastembed {
            embedding
                .model
                .validate()
                .map_err(|e| PipelineError::config(e.to_string()))?;
            let expected = embedding
                .model
                .expected_dimension()
                .map_err(|e| PipelineError::config(e.to_string()))?;
            if expected != embedding.dimension {
                return Err(PipelineError::config(format!(
                    "model {} produces {expected}-dimensional vectors, configured dimension is {}",
                    embedding.model.model_name(),
                    embedding.dimension
                )));
            }
        }

        let generator = &self.generator;
        if generator.endpoint.trim().is_empty() {
            return Err(PipelineError::config("generator endpoint must not be empty"));
        }
        if generator.model.trim().is_empty() {
            return Err(PipelineError::config("generator model must not be empty"));
        }

        let timeouts = [
            ("embedding.timeout_secs", embedding.timeout_secs),
            ("generator.timeout_secs", generator.timeout_secs),
            ("generator.probe_timeout_secs", generator.probe_timeout_secs),
        ];
        for (name, value) in timeouts {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::config(format!("{name} must be a positive number")));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(PipelineError::config("top_k must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.generator.endpoint, "http://localhost:11434");
        assert!((config.generator.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [chunking]
            chunk_size = 400

            [embedding]
            backend = "hash"
            dimension = 64

            [index]
            replace_on_reingest = true
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.embedding.dimension, 64);
        assert!(config.index.replace_on_reingest);
        assert_eq!(config.retrieval.top_k, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\ntop_k = 5").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 5);

        let missing = PipelineConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let err = PipelineConfig::from_toml_str("[chunking\nchunk_size = 1").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = PipelineConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));

        config.chunking.chunk_size = 0;
        config.chunking.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dimension_must_match_model() {
        let mut config = PipelineConfig::default();
        config.embedding.dimension = 768;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("384"));

        config.embedding.backend = EmbeddingBackend::Hash;
        config.validate().unwrap();

        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_generator_and_retrieval_settings() {
        let mut config = PipelineConfig::default();
        config.generator.endpoint = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.generator.probe_timeout_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }
}
