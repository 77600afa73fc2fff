//! Answer generation backends.

use crate::config::GeneratorConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prompt sent to the model. `{context}` and `{question}` are substituted.
pub const PROMPT_TEMPLATE: &str = "Use the following context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

Context:
{context}

Question: {question}
Helpful Answer:";

/// Fill [`PROMPT_TEMPLATE`] with a context and a question.
pub fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Produces an answer from retrieved context.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `question` using only `context`. The answer is whitespace-trimmed.
    async fn generate(&self, context: &str, question: &str) -> Result<String>;

    /// Cheap liveness check. Any failure is reported as `false`.
    async fn probe(&self) -> bool;

    fn model_name(&self) -> &str;
}

/// Generator backed by an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    probe_timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            probe_timeout: config.probe_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Whether `name` from `/api/tags` refers to the configured model.
    /// Ollama reports untagged models with an implicit `:latest`.
    fn is_configured_model(&self, name: &str) -> bool {
        name == self.model
            || name
                .strip_suffix(":latest")
                .is_some_and(|base| base == self.model)
    }

    async fn check_model_listed(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| PipelineError::generation_with("Ollama is not reachable", e))?;
        if !response.status().is_success() {
            return Err(PipelineError::generation(format!(
                "Ollama returned {} for /api/tags",
                response.status()
            )));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::generation_with("failed to parse /api/tags response", e))?;
        Ok(tags.models.iter().any(|m| self.is_configured_model(&m.name)))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_prompt(context, question);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::generation_with("failed to call Ollama", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(PipelineError::generation(format!(
                "Ollama returned {status}: {text}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::generation_with("failed to parse Ollama response", e))?;
        Ok(parsed.response.trim().to_string())
    }

    async fn probe(&self) -> bool {
        match self.check_model_listed().await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Ollama is up but model {} is not available", self.model);
                false
            }
            Err(e) => {
                tracing::warn!("Generator probe failed: {}", e);
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
