//! Result shapes returned by the orchestrator.
//!
//! These serialize to the JSON the CLI prints, with camelCase keys and a
//! `status` of `"success"` or `"error"`.

use crate::index::DocumentInfo;
use crate::orchestrator::ConnectionState;
use serde::{Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub status: ResultStatus,
    pub document_path: String,
    pub chunks_processed: usize,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

impl IngestResult {
    pub fn success(path: &Path, chunks_processed: usize, elapsed: Duration) -> Self {
        Self {
            status: ResultStatus::Success,
            document_path: path.display().to_string(),
            chunks_processed,
            elapsed_seconds: elapsed.as_secs_f64(),
            error: None,
        }
    }

    /// Failed ingest. Nothing was stored, so the chunk count is always 0.
    pub fn failure(path: &Path, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            status: ResultStatus::Error,
            document_path: path.display().to_string(),
            chunks_processed: 0,
            elapsed_seconds: elapsed.as_secs_f64(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Where an answer's context came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub document: String,
    /// Serialized as the page number, or `"unknown"` for unpaged documents
    #[serde(serialize_with = "serialize_page")]
    pub page: Option<u32>,
}

fn serialize_page<S: Serializer>(page: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    match page {
        Some(number) => serializer.serialize_u32(*number),
        None => serializer.serialize_str("unknown"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub status: ResultStatus,
    pub question: String,
    pub answer: Option<String>,
    pub sources: Vec<Source>,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn success(question: &str, answer: String, sources: Vec<Source>, elapsed: Duration) -> Self {
        Self {
            status: ResultStatus::Success,
            question: question.to_string(),
            answer: Some(answer),
            sources,
            elapsed_seconds: elapsed.as_secs_f64(),
            error: None,
        }
    }

    pub fn failure(question: &str, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            status: ResultStatus::Error,
            question: question.to_string(),
            answer: None,
            sources: Vec::new(),
            elapsed_seconds: elapsed.as_secs_f64(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Snapshot of the pipeline's configuration and generator health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub generator_ready: bool,
    pub state: ConnectionState,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub generator_model: String,
    pub top_k: usize,
}

/// Response of `remove_document`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResult {
    pub status: ResultStatus,
    pub document: String,
    pub records_removed: usize,
    pub error: Option<String>,
}

/// Response of `list_documents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentList {
    pub status: ResultStatus,
    pub documents: Vec<DocumentInfo>,
    pub error: Option<String>,
}

/// Human-readable duration: milliseconds below one second, seconds above.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0ms");
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "999ms");
        assert_eq!(format_elapsed(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_elapsed(Duration::from_millis(12_500)), "12.50s");
    }

    #[test]
    fn test_ingest_failure_json() {
        let result = IngestResult::failure(
            Path::new("/nonexistent.pdf"),
            "document not found: /nonexistent.pdf",
            Duration::from_millis(5),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["documentPath"], "/nonexistent.pdf");
        assert_eq!(value["chunksProcessed"], 0);
        assert_eq!(value["error"], "document not found: /nonexistent.pdf");
        assert!(value["elapsedSeconds"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_query_success_json() {
        let result = QueryResult::success(
            "Where?",
            "Here.".to_string(),
            vec![
                Source {
                    document: "a.pdf".to_string(),
                    page: Some(2),
                },
                Source {
                    document: "notes.txt".to_string(),
                    page: None,
                },
            ],
            Duration::from_secs(2),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "success",
                "question": "Where?",
                "answer": "Here.",
                "sources": [
                    {"document": "a.pdf", "page": 2},
                    {"document": "notes.txt", "page": "unknown"}
                ],
                "elapsedSeconds": 2.0,
                "error": null
            })
        );
    }

    #[test]
    fn test_query_failure_has_no_answer() {
        let result = QueryResult::failure("Why?", "generator unavailable", Duration::ZERO);
        assert!(!result.is_success());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["answer"], serde_json::Value::Null);
        assert_eq!(value["sources"], json!([]));
    }
}
