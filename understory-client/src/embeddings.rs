//! OpenAI-compatible `/embeddings` backend

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, Span};
use understory_core::config::{env_non_empty, EmbeddingConfig};
use understory_core::{EmbeddingProvider, Result, UnderstoryError};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    span: Span,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        span: Span,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| UnderstoryError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            span,
        })
    }

    /// Key read from the variable named by `config.api_key_env`; a missing
    /// key is a configuration error.
    pub fn from_config(config: &EmbeddingConfig, span: Span) -> Result<Self> {
        let api_key = env_non_empty(&config.api_key_env).ok_or_else(|| {
            UnderstoryError::Configuration(format!(
                "embedding backend enabled but {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(&config.endpoint, api_key, &config.model, config.dimension, span)
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimension,
        };
        let response = self
            .http
            .post(format!("{}/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| UnderstoryError::Embedding(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(UnderstoryError::Embedding(format!(
                "HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| UnderstoryError::Embedding(format!("unexpected response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(UnderstoryError::Embedding(format!(
                "{} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        if let Some(bad) = parsed.data.iter().find(|d| d.embedding.len() != self.dimension) {
            return Err(UnderstoryError::Embedding(format!(
                "expected dimension {}, got {}",
                self.dimension,
                bad.embedding.len()
            )));
        }
        debug!(parent: &self.span, inputs = texts.len(), model = %self.model, "Embedded batch");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
