//! Embedding provider client (Ollama-compatible `/api/embed`).

use async_trait::async_trait;
use serde::Deserialize;

use garden_core::ProviderSettings;

use crate::errors::{SearchError, SearchResult};

/// Anything that can turn text into vectors. The ranker and the sync
/// indexer both talk to this trait so tests can swap in a stub.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, inputs: &[String]) -> SearchResult<Vec<Vec<f32>>>;

    async fn embed_one(&self, input: &str) -> SearchResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::Embedding("provider returned no vector".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.vector_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed_batch(&self, inputs: &[String]) -> SearchResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(SearchError::Embedding(
            "embedding response missing vectors".to_string(),
        ))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}
