//! Answer-generation client (Ollama-compatible `/api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use garden_core::ProviderSettings;

use crate::errors::{SearchError, SearchResult};

/// Generates a free-text answer from a prompt. Behind a trait so the
/// advanced-search orchestrator can be tested without a live model.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> SearchResult<String>;
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.llm_url.trim_end_matches('/').to_string(),
            model: settings.llm_model.clone(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(settings.llm_timeout_seconds),
        }
    }
}

#[async_trait]
impl AnswerModel for LlmClient {
    async fn generate(&self, prompt: &str) -> SearchResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Llm(format!("generation timed out after {:?}", self.timeout))
                } else {
                    SearchError::Llm(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Llm(format!(
                "generation request failed: {status} {text}"
            )));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Llm(e.to_string()))?;
        Ok(payload.response)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}
