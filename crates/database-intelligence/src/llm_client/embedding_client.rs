use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};
use super::wire::{EmbeddingRequest, EmbeddingResponse};
use super::{require_api_key, status_error, EmbeddingProvider};
use crate::config::Config;
use crate::error::ProviderError;

const PROVIDER: &str = "embedding";

/// HTTP client for the `/embeddings` endpoint.
pub struct EmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    http_client: reqwest::Client,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl EmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            &config.openai_api_url,
            &config.openai_api_key,
            &config.embedding_model,
            config.embedding_dimension,
            Duration::from_secs(config.provider_timeout_seconds),
        )
        .map(|client| {
            client.with_retry_policy(RetryPolicy::new(
                config.provider_max_attempts,
                Duration::from_secs(2),
            ))
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(String::as_str).collect(),
        };

        let response = self
            .http_client
            .post(self.embeddings_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut body: EmbeddingResponse = response.json().await?;
        if body.data.is_empty() {
            return Err(ProviderError::EmptyPayload);
        }
        if body.data.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        if let Some(usage) = &body.usage {
            debug!(
                "Embedded {} texts with {} ({} tokens)",
                texts.len(),
                body.model.as_deref().unwrap_or(&self.model),
                usage.total_tokens
            );
        }

        body.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(ProviderError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(ProviderError::EmptyPayload)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        require_api_key(&self.api_key)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(PROVIDER, &self.retry, self.sleeper.as_ref(), || {
            self.request_once(texts)
        })
        .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
