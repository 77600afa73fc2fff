//! # docqa-embed
//!
//! Text embeddings for the document QA pipeline. Models run locally through
//! FastEmbed's ONNX runtime, so no external API is involved.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: sentence-transformer models such as
//!   `all-MiniLM-L6-v2` (the default, 384 dimensions). Loaded models are
//!   cached process-wide.
//! - [`HashEmbedProvider`]: a deterministic feature-hashing embedder for
//!   offline runs and tests.
//!
//! Vectors are returned as half-precision (f16) and L2-normalized unless
//! [`EmbedConfig::normalize`] is turned off.

pub mod config;
pub mod error;
pub mod provider;

pub use config::{DEFAULT_MODEL, EmbedConfig};
pub use error::{EmbedError, Result};
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, HashEmbedProvider, normalize_to_f16,
};
