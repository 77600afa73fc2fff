//! Error types for the pipeline

use std::path::PathBuf;
use std::time::Duration;

use docqa_embed::EmbedError;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every failure the pipeline can run into.
///
/// Only [`PipelineError::Configuration`] escapes the orchestrator's
/// constructor. Everything else is turned into an error result by
/// [`PipelineOrchestrator`](crate::orchestrator::PipelineOrchestrator).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The document path does not resolve to a readable file
    #[error("document not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The document could not be decoded into text
    #[error("could not parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The embedding model failed
    #[error("embedding backend error: {0}")]
    EmbeddingBackend(#[from] EmbedError),

    /// The generation backend failed or returned something unusable
    #[error("generation failed: {message}")]
    Generation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid settings, or components that disagree with each other
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The vector index could not read or write records
    #[error("vector index error: {message}")]
    Index {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A backend call did not finish in time
    #[error("{operation} timed out after {:.1}s", limit.as_secs_f64())]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

impl PipelineError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            source: None,
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            source: None,
        }
    }

    /// Generation error that keeps the underlying cause.
    pub fn generation_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Generation {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(source: sqlx::Error) -> Self {
        Self::Index {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Run `future` with an upper bound on its duration.
pub(crate) async fn with_timeout<T, F>(operation: &'static str, limit: Duration, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout { operation, limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::NotFound {
            path: PathBuf::from("/nonexistent.pdf"),
        };
        assert_eq!(err.to_string(), "document not found: /nonexistent.pdf");

        let err = PipelineError::parse("broken.pdf", "no extractable text");
        assert_eq!(err.to_string(), "could not parse broken.pdf: no extractable text");

        let err = PipelineError::Timeout {
            operation: "generation",
            limit: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "generation timed out after 1.5s");
    }

    #[test]
    fn test_embed_error_conversion() {
        let err: PipelineError = EmbedError::invalid_config("bad model").into();
        assert!(matches!(err, PipelineError::EmbeddingBackend(_)));
        assert!(err.to_string().contains("bad model"));
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let ok = with_timeout("quick", Duration::from_secs(1), async { Ok(5) }).await;
        assert_eq!(ok.unwrap(), 5);

        let slow = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            slow,
            Err(PipelineError::Timeout {
                operation: "slow",
                ..
            })
        ));
    }
}
